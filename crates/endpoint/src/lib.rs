//! Pomodoro relay endpoints: reconnecting client, timer producer, panel consumer.

pub mod cli;
pub mod config;
pub mod consumer;
pub mod producer;
pub mod relay_client;

#[cfg(test)]
mod testing;
