//! Endpoint configuration from the environment.

use std::time::Duration;

use crate::relay_client::{BackoffPolicy, ClientConfig, DEFAULT_RECONNECT_DELAY};

pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8787";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: expected a number of milliseconds, got {value:?}")]
    InvalidMillis { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub relay_url: String,
    pub reconnect_delay: Duration,
    /// Unset keeps the reconnect interval flat; set enables doubling up to this cap.
    pub reconnect_max_delay: Option<Duration>,
    pub emit_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reconnect_max_delay: None,
            emit_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            relay_url: std::env::var("RELAY_URL").unwrap_or(defaults.relay_url),
            reconnect_delay: millis_var("RECONNECT_DELAY_MS")?.unwrap_or(defaults.reconnect_delay),
            reconnect_max_delay: millis_var("RECONNECT_MAX_DELAY_MS")?,
            emit_interval: millis_var("EMIT_INTERVAL_MS")?
                .unwrap_or(defaults.emit_interval)
                .max(Duration::from_millis(50)),
        })
    }

    pub fn backoff(&self) -> BackoffPolicy {
        match self.reconnect_max_delay {
            Some(max) => BackoffPolicy::Exponential {
                initial: self.reconnect_delay,
                max: max.max(self.reconnect_delay),
            },
            None => BackoffPolicy::Fixed(self.reconnect_delay),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.relay_url.clone(),
            backoff: self.backoff(),
        }
    }
}

fn millis_var(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidMillis { var, value }),
        Err(_) => Ok(None),
    }
}
