//! Connect and socket-handler configuration.
//!
//! Durations are kept as millisecond integers so the structs deserialize from
//! plain JSON; accessors hand out `Duration`s.

use crate::packet::TCP_MTU;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Timing and ordering policy for connect jobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Time after the last attempt start before another candidate is tried in
    /// parallel (default: 250).
    pub attempt_delay_ms: u64,
    /// Time a single pending socket is given before it is abandoned
    /// (default: 3000).
    pub connect_timeout_ms: u64,
    /// Alternate address families instead of keeping resolver order
    /// (default: false).
    pub interleave_families: bool,
    /// Disable Nagle on every attempted socket (default: true).
    pub nodelay: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            attempt_delay_ms: 250,
            connect_timeout_ms: 3000,
            interleave_families: false,
            nodelay: true,
        }
    }
}

impl ConnectConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay before a parallel attempt.
    pub fn attempt_delay(mut self, delay: Duration) -> Self {
        self.attempt_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the per-socket connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable family interleaving.
    pub fn interleave_families(mut self, enable: bool) -> Self {
        self.interleave_families = enable;
        self
    }

    /// Enable or disable TCP_NODELAY on attempted sockets.
    pub fn nodelay(mut self, enable: bool) -> Self {
        self.nodelay = enable;
        self
    }

    pub fn attempt_delay_duration(&self) -> Duration {
        Duration::from_millis(self.attempt_delay_ms)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Limits for a [`SocketHandler`](crate::socket::handler::SocketHandler).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Largest declared size accepted for an inbound packet (default: 32767).
    pub max_packet_size: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_packet_size: TCP_MTU,
        }
    }
}

impl HandlerConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inbound packet size limit.
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}
