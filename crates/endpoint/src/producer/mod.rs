//! Producer side: observe a timer source, publish snapshots, apply commands.

mod timer;

use std::time::Duration;

use protocol::{Command, Message, StateSnapshot};
use tokio::sync::{mpsc, Notify};

use crate::relay_client::{ClientState, RelayClient};

pub use timer::{SimulatedTimer, MAX_PHASE_MINUTES};

/// The observed timer source.
pub trait Observer: Send {
    /// Best-effort read. Must not fail; fields that could not be read are left `None`
    /// so they do not overwrite good data downstream.
    fn observe(&mut self) -> StateSnapshot;

    /// Performs `cmd`, or nothing if the source is already in that condition.
    fn apply_command(&mut self, cmd: Command);
}

/// Publishes a snapshot every `interval`, whenever `changes` is notified, right after
/// each applied command, and each time the client becomes ready. Returns when the
/// client has been stopped.
pub async fn run_producer<O: Observer>(
    client: &RelayClient,
    mut inbound: mpsc::UnboundedReceiver<Message>,
    observer: &mut O,
    interval: Duration,
    changes: &Notify,
) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut client_state = client.subscribe_state();

    loop {
        tokio::select! {
            _ = tick.tick() => emit(client, observer),
            _ = changes.notified() => emit(client, observer),
            changed = client_state.changed() => {
                if changed.is_err() {
                    break;
                }
                if *client_state.borrow_and_update() == ClientState::Ready {
                    emit(client, observer);
                }
            }
            msg = inbound.recv() => match msg {
                Some(Message::Command { cmd }) => {
                    tracing::info!(cmd = cmd.as_str(), "applying command");
                    observer.apply_command(cmd);
                    emit(client, observer);
                }
                Some(other) => {
                    tracing::trace!(kind = other.kind().as_str(), "ignoring message for producer");
                }
                None => break,
            },
        }
    }
}

fn emit<O: Observer>(client: &RelayClient, observer: &mut O) {
    let snapshot = observer.observe();
    if snapshot.is_empty() {
        return;
    }
    client.send_state(snapshot);
}
