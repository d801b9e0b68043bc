//! Consumer side: reduce incoming state and hand it to a renderer.

mod panel;

use protocol::{Command, Message, PomodoroState, Reducer};
use tokio::sync::{mpsc, watch};

use crate::relay_client::RelayHandle;

pub use panel::{PanelStyle, PanelView, TerminalPanel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandRejected {
    #[error("controls are disabled until the page is logged in")]
    ControlsDisabled,
    #[error("relay not connected")]
    NotConnected,
}

/// Sends `cmd` the way a panel menu would: only while its controls are enabled.
pub fn send_panel_command(
    handle: &RelayHandle,
    controls: &watch::Receiver<bool>,
    cmd: Command,
) -> Result<(), CommandRejected> {
    if !*controls.borrow() {
        return Err(CommandRejected::ControlsDisabled);
    }
    if handle.send_command(cmd) {
        Ok(())
    } else {
        Err(CommandRejected::NotConnected)
    }
}

pub trait Renderer: Send {
    /// Called with the initial state and after every merge.
    fn on_state_changed(&mut self, state: &PomodoroState);
}

/// Folds inbound `state` messages until the channel closes, returning the reducer.
pub async fn run_consumer<R: Renderer>(
    mut inbound: mpsc::UnboundedReceiver<Message>,
    renderer: &mut R,
) -> Reducer {
    let mut reducer = Reducer::new();
    renderer.on_state_changed(reducer.state());

    while let Some(msg) = inbound.recv().await {
        match msg {
            Message::State(snapshot) => {
                let state = reducer.apply(&snapshot);
                renderer.on_state_changed(state);
            }
            other => {
                tracing::trace!(kind = other.kind().as_str(), "ignoring message for consumer");
            }
        }
    }
    reducer
}
