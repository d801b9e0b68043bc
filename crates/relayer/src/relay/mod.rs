//! Relay routing table: classifies endpoints by declared role and fans frames
//! from one role set to the other.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use protocol::{codec, Message, MessageKind, PomodoroState, Role};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Process-local handle of one accepted socket. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Text frames queued for an endpoint's writer task.
pub type Outbound = mpsc::UnboundedSender<String>;

/// What the socket loop should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Close,
}

#[derive(Default)]
struct RoutingTable {
    unannounced: HashMap<ConnectionId, Outbound>,
    producers: HashMap<ConnectionId, Outbound>,
    consumers: HashMap<ConnectionId, Outbound>,
}

impl RoutingTable {
    fn role_of(&self, id: ConnectionId) -> Option<Role> {
        if self.producers.contains_key(&id) {
            Some(Role::Producer)
        } else if self.consumers.contains_key(&id) {
            Some(Role::Consumer)
        } else {
            None
        }
    }

    fn set_mut(&mut self, role: Role) -> &mut HashMap<ConnectionId, Outbound> {
        match role {
            Role::Producer => &mut self.producers,
            Role::Consumer => &mut self.consumers,
        }
    }

    fn remove(&mut self, id: ConnectionId) -> Option<Outbound> {
        self.unannounced
            .remove(&id)
            .or_else(|| self.producers.remove(&id))
            .or_else(|| self.consumers.remove(&id))
    }
}

/// Broker state shared by every socket task.
pub struct RelayState {
    table: Mutex<RoutingTable>,
    replay_state: bool,
    last_state: Mutex<Option<PomodoroState>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RelayState {
    pub fn new(replay_state: bool) -> Self {
        Self {
            table: Mutex::new(RoutingTable::default()),
            replay_state,
            last_state: Mutex::new(None),
        }
    }

    /// Registers a freshly accepted socket with no role yet.
    pub fn connect(&self, outbound: Outbound) -> ConnectionId {
        let id = ConnectionId::new();
        lock(&self.table).unannounced.insert(id, outbound);
        tracing::debug!(conn_id = %id, "endpoint connected");
        id
    }

    /// Removes the endpoint from whichever set holds it. Dropping its sender
    /// ends the writer task, which closes the socket.
    pub fn disconnect(&self, id: ConnectionId) {
        if lock(&self.table).remove(id).is_some() {
            tracing::debug!(conn_id = %id, "endpoint removed");
        }
    }

    pub fn role_of(&self, id: ConnectionId) -> Option<Role> {
        lock(&self.table).role_of(id)
    }

    /// Number of open (producers, consumers).
    pub fn counts(&self) -> (usize, usize) {
        let table = lock(&self.table);
        (table.producers.len(), table.consumers.len())
    }

    /// Handles one text frame received from `id`.
    pub fn handle_text(&self, id: ConnectionId, text: &str) -> Disposition {
        let kind = match codec::peek_kind(text) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!(conn_id = %id, error = %e, "dropping malformed frame");
                return Disposition::Keep;
            }
        };
        let role = self.role_of(id);

        match (kind, role) {
            (MessageKind::Hello, _) => match codec::decode(text) {
                Ok(Message::Hello { client }) => {
                    self.announce(id, client);
                    Disposition::Keep
                }
                Ok(_) | Err(_) if role.is_none() => {
                    tracing::warn!(conn_id = %id, "invalid hello, closing");
                    Disposition::Close
                }
                _ => {
                    tracing::debug!(conn_id = %id, "dropping invalid hello");
                    Disposition::Keep
                }
            },
            (_, None) => {
                tracing::warn!(
                    conn_id = %id,
                    kind = kind.as_str(),
                    "first message was not hello, closing"
                );
                Disposition::Close
            }
            (MessageKind::State, Some(Role::Producer)) => {
                // Cached and fanned out in one step so an announcing consumer sees the
                // frame either in its replay or live.
                let mut table = lock(&self.table);
                self.remember_state(id, text);
                fan_out(&mut table, Role::Consumer, text);
                Disposition::Keep
            }
            (MessageKind::Command, Some(Role::Consumer)) => {
                self.forward(Role::Producer, text);
                Disposition::Keep
            }
            (kind, Some(role)) => {
                tracing::trace!(
                    conn_id = %id,
                    %role,
                    kind = kind.as_str(),
                    "ignoring role/type mismatch"
                );
                Disposition::Keep
            }
        }
    }

    /// Puts `id` into the set for `role`, taking it out of any other set.
    pub fn announce(&self, id: ConnectionId, role: Role) {
        let mut table = lock(&self.table);
        let Some(outbound) = table.remove(id) else {
            return;
        };
        let replay = if role == Role::Consumer {
            self.replay_frame()
        } else {
            None
        };
        if let Some(frame) = replay {
            if outbound.send(frame).is_err() {
                tracing::debug!(conn_id = %id, "endpoint gone before announce");
                return;
            }
        }
        table.set_mut(role).insert(id, outbound);
        tracing::info!(conn_id = %id, %role, "endpoint announced");
    }

    /// Sends `text` verbatim to every open endpoint of `to`. Endpoints whose writer is
    /// gone are removed in the same step; the rest still receive the frame.
    /// Returns how many endpoints the frame was queued for.
    pub fn forward(&self, to: Role, text: &str) -> usize {
        fan_out(&mut lock(&self.table), to, text)
    }

    /// Merges a producer frame into the replay cache. Callers hold the table lock;
    /// `last_state` is only ever taken inside it.
    fn remember_state(&self, id: ConnectionId, text: &str) {
        if !self.replay_state {
            return;
        }
        match codec::decode(text) {
            Ok(Message::State(snapshot)) => {
                lock(&self.last_state)
                    .get_or_insert_with(PomodoroState::default)
                    .merge(&snapshot);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %id, error = %e, "state not cached for replay");
            }
        }
    }

    fn replay_frame(&self) -> Option<String> {
        if !self.replay_state {
            return None;
        }
        lock(&self.last_state)
            .as_ref()
            .map(|state| codec::encode(&Message::State(state.to_snapshot())))
    }
}

fn fan_out(table: &mut RoutingTable, to: Role, text: &str) -> usize {
    let targets = table.set_mut(to);
    let mut dead = Vec::new();
    let mut delivered = 0;
    for (id, outbound) in targets.iter() {
        if outbound.send(text.to_owned()).is_ok() {
            delivered += 1;
        } else {
            dead.push(*id);
        }
    }
    for id in dead {
        targets.remove(&id);
        tracing::warn!(conn_id = %id, role = %to, "send failed, endpoint removed");
    }
    delivered
}
