//! Engine configuration types for Waystone.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls retry
//! defaults, backoff timing and storage location.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the workflow engine.
///
/// Loaded from `~/.waystone/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry ceiling applied to workflows built without an explicit one.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Per-step timeout in seconds applied to workflows built without one.
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: u64,

    /// Base delay for exponential backoff between attempts.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Optional ceiling on a single backoff delay. `None` leaves it uncapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,

    /// Capacity of the engine event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// SQLite URL for the checkpoint store. Defaults to a file in the data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_step_timeout_secs() -> u64 {
    30
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_event_capacity() -> usize {
    1024
}

impl EngineConfig {
    pub fn step_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_step_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            default_step_timeout_secs: default_step_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: None,
            event_capacity: default_event_capacity(),
            database_url: None,
        }
    }
}
