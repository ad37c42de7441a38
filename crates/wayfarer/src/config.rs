//! Server configuration: defaults, JSON loading, and startup validation.
//!
//! Every field has a default, so an empty JSON object `{}` is a valid
//! config. Durations are plain integers with the unit in the field name.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wayfarer_map::MapConfig;
use wayfarer_session::SessionConfig;
use wayfarer_transport::{DEFAULT_MAX_FRAME_SIZE, MAX_ENCODABLE_FRAME};

/// Errors from loading or validating a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything the server needs to know at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on. Default: `127.0.0.1:7777`.
    pub bind: String,

    /// Radius within which players see each other. Default: 10.0.
    pub view_distance: f32,

    /// Close sessions with no inbound traffic for this long.
    /// Default: 60000.
    pub idle_timeout_ms: u64,

    /// How often the idle sweep runs. Default: 5000.
    pub sweep_interval_ms: u64,

    /// Largest accepted frame payload. Default: 16 KiB.
    pub max_frame_size: usize,

    /// Upper bound on one position cache call. Default: 1000.
    pub cache_timeout_ms: u64,

    /// Sliding expiration of cached positions. Default: 300.
    pub cache_ttl_secs: u64,

    /// Ignore cached positions older than this when selecting nearby
    /// players. Default: off.
    pub stale_after_ms: Option<u64>,

    /// Upper bound on persisting a player's final position during
    /// teardown. Default: 1000.
    pub store_timeout_ms: u64,

    /// How long a send waits on a full outbox. Default: 1000.
    pub send_timeout_ms: u64,

    /// Outbound messages queued per connection. Default: 64.
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7777".to_string(),
            view_distance: 10.0,
            idle_timeout_ms: 60_000,
            sweep_interval_ms: 5_000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            cache_timeout_ms: 1000,
            cache_ttl_secs: 300,
            stale_after_ms: None,
            store_timeout_ms: 1000,
            send_timeout_ms: 1000,
            outbox_capacity: 64,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl ServerConfig {
    /// Parses a JSON config. Missing fields take their defaults. The
    /// result is not validated yet.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.is_empty() {
            return Err(invalid("bind", "must not be empty"));
        }
        if !self.view_distance.is_finite() || self.view_distance <= 0.0 {
            return Err(invalid("view_distance", "must be a positive number"));
        }
        if self.max_frame_size == 0 || self.max_frame_size > MAX_ENCODABLE_FRAME {
            return Err(invalid(
                "max_frame_size",
                format!("must be between 1 and {MAX_ENCODABLE_FRAME}"),
            ));
        }
        if self.outbox_capacity == 0 {
            return Err(invalid("outbox_capacity", "must be at least 1"));
        }

        let timeouts = [
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("cache_timeout_ms", self.cache_timeout_ms),
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("store_timeout_ms", self.store_timeout_ms),
            ("send_timeout_ms", self.send_timeout_ms),
        ];
        if let Some((field, _)) = timeouts.into_iter().find(|(_, v)| *v == 0) {
            return Err(invalid(field, "must be greater than zero"));
        }
        if self.stale_after_ms == Some(0) {
            return Err(invalid("stale_after_ms", "must be greater than zero when set"));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: self.idle_timeout(),
            outbox_capacity: self.outbox_capacity,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        }
    }

    pub fn map_config(&self) -> MapConfig {
        MapConfig {
            view_distance: self.view_distance,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_timeout: Duration::from_millis(self.cache_timeout_ms),
            stale_after: self.stale_after_ms.map(Duration::from_millis),
        }
    }
}
