//! Configuration for the relayer.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Relayer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub ping_interval: Duration,
    /// Greet newly announced consumers with the last known state.
    pub replay_state: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            ping_interval: Duration::from_secs(30),
            replay_state: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let host = std::env::var("RELAY_HOST").unwrap_or(defaults.host);
        let port = parse_var("RELAY_PORT", "a port number", defaults.port)?;
        let ping_secs = parse_var(
            "RELAY_PING_INTERVAL_SECS",
            "a number of seconds",
            defaults.ping_interval.as_secs(),
        )?;
        let replay_state = match std::env::var("RELAY_REPLAY_STATE") {
            Ok(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
                var: "RELAY_REPLAY_STATE",
                expected: "true or false",
                value: v,
            })?,
            Err(_) => defaults.replay_state,
        };

        Ok(Self {
            host,
            port,
            ping_interval: Duration::from_secs(ping_secs.max(1)),
            replay_state,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value: v,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
