//! Wire protocol shared by the relay and its producer/consumer endpoints.

pub mod codec;
mod models;
mod reducer;

// Explicit re-exports (avoids rust-analyzer issues with `pub use models::*`)
pub use codec::{decode, encode, peek_kind, DecodeError};
pub use models::msg_types;
pub use models::{
    Command, Message, MessageKind, Phase, Role, StateSnapshot, Timer, TIMER_UNKNOWN,
};
pub use reducer::{PomodoroState, Reducer};
