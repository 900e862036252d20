//! Tunables for a collaboration session.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! cursor_ttl_ms = 5000
//! command_buffer = 64
//! event_buffer = 256
//! hub_capacity = 256
//! roster_limit = 5
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Liveness window for a remote cursor without a fresh broadcast.
pub const DEFAULT_CURSOR_TTL_MS: u64 = 5_000;

/// Longest accepted liveness window (one hour).
pub const MAX_CURSOR_TTL_MS: u64 = 3_600_000;

/// Maximum avatar badges shown before the "+N" overflow indicator.
pub const DEFAULT_ROSTER_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Collaboration session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    /// Stale-cursor reap timeout in milliseconds
    pub cursor_ttl_ms: u64,
    /// Capacity of the manager → session command queue
    pub command_buffer: usize,
    /// Capacity of the transport → session event queue
    pub event_buffer: usize,
    /// Per-room fan-out buffer of the in-process hub
    pub hub_capacity: usize,
    /// Avatar badges shown in the presence roster
    pub roster_limit: usize,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            cursor_ttl_ms: DEFAULT_CURSOR_TTL_MS,
            command_buffer: 64,
            event_buffer: 256,
            hub_capacity: 256,
            roster_limit: DEFAULT_ROSTER_LIMIT,
        }
    }
}

impl CollabConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: CollabConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or disable the session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cursor_ttl_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "cursor_ttl_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.cursor_ttl_ms > MAX_CURSOR_TTL_MS {
            return Err(ConfigError::Invalid {
                field: "cursor_ttl_ms",
                reason: format!("must be at most {MAX_CURSOR_TTL_MS}"),
            });
        }
        for (field, value) in [
            ("command_buffer", self.command_buffer),
            ("event_buffer", self.event_buffer),
            ("hub_capacity", self.hub_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "buffer capacity must be non-zero".into(),
                });
            }
        }
        Ok(())
    }

    pub fn cursor_ttl(&self) -> Duration {
        Duration::from_millis(self.cursor_ttl_ms)
    }
}
