//! Reconnecting relay client.
//!
//! A driver task owns the connection and walks
//! `Disconnected -> Connecting -> Announcing -> Ready -> Disconnected` until stopped.
//! Callers only see [`RelayClient`] / [`RelayHandle`]: sends while not `Ready` are
//! dropped, inbound messages arrive on one channel that survives reconnects.

mod backoff;
mod session;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use protocol::{Command, Message, Role, StateSnapshot};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub use backoff::{Backoff, BackoffPolicy, DEFAULT_RECONNECT_DELAY};
pub use session::{Session, SessionError, SessionReader, SessionWriter};

/// Where the client is in its connection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    /// Socket open, hello being written.
    Announcing,
    Ready,
    /// Torn down; terminal.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub backoff: BackoffPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: BackoffPolicy::default(),
        }
    }
}

type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable send surface. Holds the current session's outbound queue only while ready.
#[derive(Clone)]
pub struct RelayHandle {
    outbound: OutboundSlot,
}

impl RelayHandle {
    /// Queues `msg` on the live session. Returns `false` (message dropped) when not ready.
    pub fn send(&self, msg: Message) -> bool {
        match lock(&self.outbound).as_ref() {
            Some(tx) => tx.send(msg).is_ok(),
            None => {
                tracing::trace!(kind = msg.kind().as_str(), "relay not ready, dropping message");
                false
            }
        }
    }

    pub fn send_state(&self, snapshot: StateSnapshot) -> bool {
        self.send(Message::State(snapshot))
    }

    pub fn send_command(&self, cmd: Command) -> bool {
        self.send(Message::command(cmd))
    }
}

pub struct RelayClient {
    handle: RelayHandle,
    state_rx: watch::Receiver<ClientState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RelayClient {
    /// Spawns the driver and returns the client plus the receiver for inbound messages.
    /// The receiver yields `None` once the client is stopped.
    pub fn start(config: ClientConfig, role: Role) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let outbound: OutboundSlot = Arc::new(Mutex::new(None));

        let driver = Driver {
            config,
            role,
            outbound: outbound.clone(),
            inbound: inbound_tx,
            state: state_tx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(driver.run());

        let client = Self {
            handle: RelayHandle { outbound },
            state_rx,
            shutdown: shutdown_tx,
            task: Some(task),
        };
        (client, inbound_rx)
    }

    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    pub fn send(&self, msg: Message) -> bool {
        self.handle.send(msg)
    }

    pub fn send_state(&self, snapshot: StateSnapshot) -> bool {
        self.handle.send_state(snapshot)
    }

    pub fn send_command(&self, cmd: Command) -> bool {
        self.handle.send_command(cmd)
    }

    pub fn state(&self) -> ClientState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state_rx.clone()
    }

    /// Resolves once the client is ready; `false` if it stopped first.
    pub async fn ready(&self) -> bool {
        let mut rx = self.state_rx.clone();
        matches!(
            rx.wait_for(|s| matches!(s, ClientState::Ready | ClientState::Stopped))
                .await
                .map(|s| *s),
            Ok(ClientState::Ready)
        )
    }

    /// Cancels any pending reconnect, flushes queued frames, closes the socket and waits
    /// for the driver to finish. Nothing is delivered on the inbound channel afterwards.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "relay client task failed");
            }
        }
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum SessionEnd {
    Closed,
    Shutdown,
}

struct Driver {
    config: ClientConfig,
    role: Role,
    outbound: OutboundSlot,
    inbound: mpsc::UnboundedSender<Message>,
    state: watch::Sender<ClientState>,
    shutdown: watch::Receiver<bool>,
}

/// Resolves when a stop was requested or the client was dropped.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl Driver {
    async fn run(mut self) {
        let mut backoff = Backoff::new(self.config.backoff);
        loop {
            self.set_state(ClientState::Connecting);
            let connected = tokio::select! {
                _ = stop_requested(&mut self.shutdown) => break,
                res = Session::connect(&self.config.url) => res,
            };
            match connected {
                Ok(session) => {
                    backoff.reset();
                    match self.serve(session).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Closed) => {
                            tracing::info!(role = %self.role, "relay closed the connection");
                        }
                        Err(e) => {
                            tracing::warn!(role = %self.role, error = %e, "relay connection lost");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(role = %self.role, error = %e, "relay unreachable");
                }
            }

            self.set_state(ClientState::Disconnected);
            let delay = backoff.next_delay();
            tracing::debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            tokio::select! {
                _ = stop_requested(&mut self.shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.clear_outbound();
        self.set_state(ClientState::Stopped);
        tracing::debug!(role = %self.role, "relay client stopped");
    }

    async fn serve(&mut self, mut session: Session) -> Result<SessionEnd, SessionError> {
        self.set_state(ClientState::Announcing);
        session.announce(self.role).await?;

        let session_id = session.id();
        let (mut writer, mut reader) = session.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(out_tx);
        self.set_state(ClientState::Ready);
        tracing::info!(role = %self.role, session = session_id, "connected to relay");

        let end = loop {
            tokio::select! {
                _ = stop_requested(&mut self.shutdown) => {
                    self.clear_outbound();
                    while let Ok(msg) = out_rx.try_recv() {
                        writer.send(&msg).await?;
                    }
                    writer.close().await;
                    break Ok(SessionEnd::Shutdown);
                }
                Some(msg) = out_rx.recv() => {
                    if let Err(e) = writer.send(&msg).await {
                        break Err(e);
                    }
                }
                inbound = reader.recv() => match inbound {
                    Ok(Some(msg)) => {
                        // The owner may have stopped listening; that is not our problem.
                        let _ = self.inbound.send(msg);
                    }
                    Ok(None) => break Ok(SessionEnd::Closed),
                    Err(e) => break Err(e),
                },
            }
        };
        self.clear_outbound();
        end
    }

    fn clear_outbound(&self) {
        lock(&self.outbound).take();
    }

    fn set_state(&self, state: ClientState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{unused_url, FakeRelay};
    use protocol::{decode, Timer};
    use std::time::Duration;

    fn fast(url: &str) -> ClientConfig {
        ClientConfig {
            url: url.to_string(),
            backoff: BackoffPolicy::Fixed(Duration::from_millis(30)),
        }
    }

    #[tokio::test]
    async fn announces_role_first() {
        let mut relay = FakeRelay::bind().await;
        let (client, _inbound) = RelayClient::start(fast(&relay.url), Role::Consumer);
        let mut conn = relay.accept().await;
        assert_eq!(
            decode(&conn.next_text().await.unwrap()).unwrap(),
            Message::hello(Role::Consumer)
        );
        assert!(client.ready().await);
        assert_eq!(client.state(), ClientState::Ready);
        client.stop().await;
    }

    #[tokio::test]
    async fn reannounces_role_after_reconnect() {
        let mut relay = FakeRelay::bind().await;
        let (client, _inbound) = RelayClient::start(fast(&relay.url), Role::Producer);

        let mut first = relay.accept().await;
        assert_eq!(
            decode(&first.next_text().await.unwrap()).unwrap(),
            Message::hello(Role::Producer)
        );
        first.close().await;

        let mut second = relay.accept().await;
        assert_eq!(
            decode(&second.next_text().await.unwrap()).unwrap(),
            Message::hello(Role::Producer)
        );

        // Keep offering state until the new session is ready and carries it.
        let snapshot = StateSnapshot {
            timer: Some(Timer::from_secs(60)),
            ..Default::default()
        };
        let sender = client.handle();
        let pump = tokio::spawn(async move {
            loop {
                sender.send_state(snapshot.clone());
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
        let next = decode(&second.next_text().await.unwrap()).unwrap();
        pump.abort();
        assert!(matches!(next, Message::State(s) if s.timer == Some(Timer::from_secs(60))));
        client.stop().await;
    }

    #[tokio::test]
    async fn sends_are_dropped_while_disconnected() {
        let url = unused_url().await;
        let (client, _inbound) = RelayClient::start(fast(&url), Role::Consumer);
        assert!(!client.send_command(Command::Start));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_ne!(client.state(), ClientState::Ready);
        assert!(!client.send_command(Command::Pause));
        client.stop().await;
    }

    #[tokio::test]
    async fn stop_cancels_pending_reconnect_timer() {
        let url = unused_url().await;
        let config = ClientConfig {
            url,
            backoff: BackoffPolicy::Fixed(Duration::from_secs(3600)),
        };
        let (client, mut inbound) = RelayClient::start(config, Role::Producer);
        let mut states = client.subscribe_state();
        states
            .wait_for(|s| *s == ClientState::Disconnected)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), client.stop())
            .await
            .expect("stop must not wait for the reconnect delay");
        assert_eq!(*states.borrow(), ClientState::Stopped);
        assert!(inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn inbound_frames_are_decoded_and_junk_skipped() {
        let mut relay = FakeRelay::bind().await;
        let (client, mut inbound) = RelayClient::start(fast(&relay.url), Role::Producer);
        let mut conn = relay.accept().await;
        conn.next_text().await.unwrap();

        conn.send_text("definitely not json").await;
        conn.send_text(r#"{"type":"unknown"}"#).await;
        conn.send_text(r#"{"type":"command","cmd":"start"}"#).await;
        let msg = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, Message::command(Command::Start));
        client.stop().await;
    }

    #[tokio::test]
    async fn stop_flushes_queued_frames() {
        let mut relay = FakeRelay::bind().await;
        let (client, _inbound) = RelayClient::start(fast(&relay.url), Role::Consumer);
        let mut conn = relay.accept().await;
        conn.next_text().await.unwrap();
        assert!(client.ready().await);

        assert!(client.send_command(Command::Pause));
        client.stop().await;
        assert_eq!(
            decode(&conn.next_text().await.unwrap()).unwrap(),
            Message::command(Command::Pause)
        );
        assert_eq!(conn.next_text().await, None);
    }

    #[tokio::test]
    async fn ready_reports_false_after_stop() {
        let url = unused_url().await;
        let (client, _inbound) = RelayClient::start(fast(&url), Role::Consumer);
        let mut states = client.subscribe_state();
        let _ = client.shutdown.send(true);
        states
            .wait_for(|s| *s == ClientState::Stopped)
            .await
            .unwrap();
        assert!(!client.ready().await);
    }
}
