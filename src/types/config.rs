//! Configuration structures.
//!
//! Runtime configuration for the administrator process itself, loaded from a
//! config file or assembled in code. Not to be confused with [`crate::conf`],
//! which holds the per-package/service/component configuration objects the
//! administrator manages.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Administrator behavior.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Administrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Grace period a stopping component gets between the termination signal
    /// and forced kill.
    #[serde(with = "humantime_serde")]
    pub stop_grace_period: Duration,

    /// How often the supervisory loop polls runtimes for self-exited
    /// main processes.
    #[serde(with = "humantime_serde")]
    pub reap_interval: Duration,

    /// Capacity of the admin command channel.
    pub command_channel_capacity: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            stop_grace_period: Duration::from_secs(10),
            reap_interval: Duration::from_millis(500),
            command_channel_capacity: 64,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
