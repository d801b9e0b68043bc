//! Pomodoro relay endpoints.
//!
//! Optional env: RELAY_URL, RECONNECT_DELAY_MS, RECONNECT_MAX_DELAY_MS, EMIT_INTERVAL_MS

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use endpoint::cli;
use endpoint::config::Config;
use endpoint::consumer::{run_consumer, send_panel_command, TerminalPanel};
use endpoint::producer::{run_producer, Observer, SimulatedTimer};
use endpoint::relay_client::{RelayClient, RelayHandle};
use protocol::{Command, Role};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{watch, Notify};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the panel.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    match cli.command.unwrap_or(cli::Commands::Consume) {
        cli::Commands::Consume => consume(&config).await,
        cli::Commands::Produce {
            task,
            work_minutes,
            break_minutes,
        } => {
            let timer = SimulatedTimer::new(
                task,
                Duration::from_secs(work_minutes * 60),
                Duration::from_secs(break_minutes * 60),
            );
            produce(&config, timer).await
        }
        cli::Commands::Send { cmd, timeout_secs } => send_once(&config, cmd, timeout_secs).await,
    }
}

async fn consume(config: &Config) -> anyhow::Result<()> {
    let (client, inbound) = RelayClient::start(config.client_config(), Role::Consumer);
    let mut panel = TerminalPanel::new(std::io::stdout());
    let input = tokio::spawn(read_commands(client.handle(), panel.controls()));

    tokio::select! {
        _ = run_consumer(inbound, &mut panel) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    input.abort();
    client.stop().await;
    Ok(())
}

/// Reads `start` / `pause` lines from stdin and sends them while the panel offers controls.
async fn read_commands(handle: RelayHandle, controls: watch::Receiver<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(cmd) => {
                if let Err(e) = send_panel_command(&handle, &controls, cmd) {
                    tracing::warn!(cmd = cmd.as_str(), "command dropped: {}", e);
                }
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }
}

async fn produce(config: &Config, timer: SimulatedTimer) -> anyhow::Result<()> {
    let (client, inbound) = RelayClient::start(config.client_config(), Role::Producer);
    let changes = Arc::new(Notify::new());
    let edits = tokio::spawn(read_page_edits(timer.clone(), changes.clone()));
    let mut observer = timer;

    tokio::select! {
        _ = run_producer(&client, inbound, &mut observer, config.emit_interval, &changes) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    edits.abort();
    client.stop().await;
    Ok(())
}

/// Local edits to the simulated page, as a user on the page would make them:
/// `start`, `pause`, `task <label>`, `login`, `logout`.
async fn read_page_edits(mut timer: SimulatedTimer, changes: Arc<Notify>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "" => continue,
            "task" => timer.set_task(rest.trim()),
            "login" => timer.set_logged_in(true),
            "logout" => timer.set_logged_in(false),
            other => match other.parse::<Command>() {
                Ok(cmd) => timer.apply_command(cmd),
                Err(e) => {
                    tracing::warn!("{}", e);
                    continue;
                }
            },
        }
        changes.notify_one();
    }
}

async fn send_once(config: &Config, cmd: Command, timeout_secs: u64) -> anyhow::Result<()> {
    let (client, _inbound) = RelayClient::start(config.client_config(), Role::Consumer);
    let ready = tokio::time::timeout(Duration::from_secs(timeout_secs), client.ready()).await;
    if !matches!(ready, Ok(true)) {
        client.stop().await;
        anyhow::bail!("relay not reachable at {}", config.relay_url);
    }
    client.send_command(cmd);
    client.stop().await;
    println!("sent {}", cmd.as_str());
    Ok(())
}
