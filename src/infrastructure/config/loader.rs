use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, EngineConfig};

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Tenant id cannot be empty")]
    EmptyTenantId,

    #[error("Invalid debounce_window_ms: {0}. Must be at least 1")]
    InvalidDebounceWindow(u64),

    #[error("Invalid liveness_check_interval_ms: {0}. Must be at least 1")]
    InvalidCheckInterval(u64),

    #[error(
        "Invalid liveness configuration: liveness_timeout_ms ({0}) must not be shorter than liveness_check_interval_ms ({1})"
    )]
    TimeoutShorterThanInterval(u64, u64),

    #[error("Invalid event_channel_capacity: {0}. Must be at least 1")]
    InvalidChannelCapacity(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .taskfeed/config.yaml (project config)
    /// 3. .taskfeed/local.yaml (project local overrides, optional)
    /// 4. Environment variables (TASKFEED_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("TASKFEED_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".taskfeed/config.yaml"))
            .merge(Yaml::file(".taskfeed/local.yaml"))
            .merge(Env::prefixed("TASKFEED_").split("__"))
    }

    /// Validate engine timing and capacity on their own
    ///
    /// Used wherever an `EngineConfig` arrives by a path other than
    /// [`ConfigLoader::load`], such as a replay script.
    pub fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
        if engine.debounce_window_ms == 0 {
            return Err(ConfigError::InvalidDebounceWindow(engine.debounce_window_ms));
        }
        if engine.liveness_check_interval_ms == 0 {
            return Err(ConfigError::InvalidCheckInterval(
                engine.liveness_check_interval_ms,
            ));
        }
        if engine.liveness_timeout_ms < engine.liveness_check_interval_ms {
            return Err(ConfigError::TimeoutShorterThanInterval(
                engine.liveness_timeout_ms,
                engine.liveness_check_interval_ms,
            ));
        }
        if engine.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity(
                engine.event_channel_capacity,
            ));
        }
        Ok(())
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.tenant_id.trim().is_empty() {
            return Err(ConfigError::EmptyTenantId);
        }

        Self::validate_engine(&config.engine)?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}
