//! CLI argument parsing.

use clap::{Parser, Subcommand};
use protocol::Command;

use crate::producer::MAX_PHASE_MINUTES;

#[derive(Parser)]
#[command(name = "endpoint")]
#[command(about = "Pomodoro relay endpoints: timer producer and panel consumer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the timer as a status line; type `start` or `pause` to control it [default]
    Consume,

    /// Publish a simulated Pomodoro timer; commands from panels drive it
    Produce {
        /// Task label shown on panels
        #[arg(long, default_value = "")]
        task: String,

        /// Length of a work phase, at most 99
        #[arg(long, default_value_t = 25, value_parser = phase_minutes())]
        work_minutes: u64,

        /// Length of a break phase, at most 99
        #[arg(long, default_value_t = 5, value_parser = phase_minutes())]
        break_minutes: u64,
    },

    /// Send one command to every producer and exit
    Send {
        /// `start` or `pause`
        #[arg(value_name = "CMD", value_parser = parse_command)]
        cmd: Command,

        /// Give up if the relay is not reachable within this many seconds
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
}

fn phase_minutes() -> clap::builder::RangedU64ValueParser<u64> {
    clap::value_parser!(u64).range(1..=MAX_PHASE_MINUTES)
}

fn parse_command(s: &str) -> Result<Command, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn produce(args: &[&str]) -> Result<(u64, u64), clap::Error> {
        let mut argv = vec!["endpoint", "produce"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv)?;
        match cli.command {
            Some(Commands::Produce {
                work_minutes,
                break_minutes,
                ..
            }) => Ok((work_minutes, break_minutes)),
            _ => panic!("expected produce"),
        }
    }

    #[test]
    fn phase_lengths_default_to_pomodoro() {
        assert_eq!(produce(&[]).unwrap(), (25, 5));
    }

    #[test]
    fn phase_lengths_are_bounded() {
        assert_eq!(
            produce(&["--work-minutes", "99", "--break-minutes", "99"]).unwrap(),
            (99, 99)
        );
        assert!(produce(&["--work-minutes", "120"]).is_err());
        assert!(produce(&["--break-minutes", "0"]).is_err());
    }

    #[test]
    fn send_parses_command() {
        let cli = Cli::try_parse_from(["endpoint", "send", "START"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Send { cmd: Command::Start, timeout_secs: 5 })
        ));
        assert!(Cli::try_parse_from(["endpoint", "send", "stop"]).is_err());
    }
}
