//! Wire message shapes exchanged between producers, consumers and the relay.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role an endpoint declares in its hello message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Observes the timer page and emits state. Older browser extensions say `browser`.
    #[serde(alias = "browser")]
    Producer,
    /// Renders state and emits commands. Older panel extensions say `gnome`.
    #[serde(alias = "gnome")]
    Consumer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }

    /// The role whose endpoints receive what this role sends.
    pub fn peer(&self) -> Role {
        match self {
            Self::Producer => Self::Consumer,
            Self::Consumer => Self::Producer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pomodoro phase as observed on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Work,
    Break,
    Paused,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Break => "break",
            Self::Paused => "paused",
        }
    }
}

/// Control instruction from a consumer to producers. Fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Pause,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            other => Err(format!("unknown command: {other}")),
        }
    }
}

/// Wire text used when the producer could not read a countdown.
pub const TIMER_UNKNOWN: &str = "--:--";

/// Countdown shown on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timer {
    #[default]
    Unknown,
    Remaining { minutes: u8, seconds: u8 },
}

impl Timer {
    /// Builds a timer from a whole number of seconds, saturating at 99:59.
    pub fn from_secs(total: u64) -> Self {
        let total = total.min(99 * 60 + 59);
        Self::Remaining {
            minutes: (total / 60) as u8,
            seconds: (total % 60) as u8,
        }
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str(TIMER_UNKNOWN),
            Self::Remaining { minutes, seconds } => write!(f, "{:02}:{:02}", minutes, seconds),
        }
    }
}

impl FromStr for Timer {
    type Err = String;

    /// Accepts `M:SS`, `MM:SS` or the unknown sentinel.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == TIMER_UNKNOWN {
            return Ok(Self::Unknown);
        }
        let invalid = || format!("invalid timer text: {s:?}");
        let (m, sec) = s.split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str, max_len: usize| {
            !part.is_empty() && part.len() <= max_len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(m, 2) || sec.len() != 2 || !digits(sec, 2) {
            return Err(invalid());
        }
        let minutes: u8 = m.parse().map_err(|_| invalid())?;
        let seconds: u8 = sec.parse().map_err(|_| invalid())?;
        if seconds >= 60 {
            return Err(invalid());
        }
        Ok(Self::Remaining { minutes, seconds })
    }
}

impl TryFrom<String> for Timer {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timer> for String {
    fn from(timer: Timer) -> Self {
        timer.to_string()
    }
}

/// One partial observation of producer state. Every field is independently optional;
/// an absent field means "not part of this update", never "reset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<Timer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_in: Option<bool>,
}

impl StateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.timer.is_none()
            && self.task.is_none()
            && self.phase.is_none()
            && self.running.is_none()
            && self.logged_in.is_none()
    }
}

/// Every message on the wire, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Hello { client: Role },
    State(StateSnapshot),
    Command { cmd: Command },
}

impl Message {
    pub fn hello(role: Role) -> Self {
        Self::Hello { client: role }
    }

    pub fn command(cmd: Command) -> Self {
        Self::Command { cmd }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Hello { .. } => MessageKind::Hello,
            Self::State(_) => MessageKind::State,
            Self::Command { .. } => MessageKind::Command,
        }
    }
}

/// Discriminator of a [`Message`], available without validating the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Hello,
    State,
    Command,
}

/// Wire values of the `type` field.
pub mod msg_types {
    pub const HELLO: &str = "hello";
    pub const STATE: &str = "state";
    pub const COMMAND: &str = "command";
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hello => msg_types::HELLO,
            Self::State => msg_types::STATE,
            Self::Command => msg_types::COMMAND,
        }
    }
}
