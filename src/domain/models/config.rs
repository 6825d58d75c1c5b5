use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Taskfeed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Tenant whose work-queue this process reconciles
    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,

    /// Reconciliation engine timing
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_tenant_id() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant_id: default_tenant_id(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Reconciliation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Quiet window used to coalesce bursts of snapshot notifications
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,

    /// Period of the liveness monitor
    #[serde(default = "default_liveness_check_interval_ms")]
    pub liveness_check_interval_ms: u64,

    /// Maximum time a delivered item may stay in the cache
    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,

    /// Capacity of the delivery sink's broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

const fn default_debounce_window_ms() -> u64 {
    200
}

const fn default_liveness_check_interval_ms() -> u64 {
    30_000
}

const fn default_liveness_timeout_ms() -> u64 {
    60_000
}

const fn default_event_channel_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: default_debounce_window_ms(),
            liveness_check_interval_ms: default_liveness_check_interval_ms(),
            liveness_timeout_ms: default_liveness_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl EngineConfig {
    pub const fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub const fn liveness_check_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_check_interval_ms)
    }

    pub const fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file output: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
