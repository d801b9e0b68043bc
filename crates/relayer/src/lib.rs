//! Pomodoro relay: brokers timer state from pages to panels and commands back.

pub mod api;
pub mod config;
pub mod relay;
