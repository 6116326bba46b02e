//! Layered configuration using Figment.
//!
//! Values are resolved in this order (later wins):
//! 1. built-in defaults,
//! 2. an optional TOML file,
//! 3. environment variables prefixed with `PROTOCOL_ENGINE_`.
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated with a double underscore:
//!
//! ```text
//! PROTOCOL_ENGINE_APPLICATION__LOG_LEVEL=debug
//! PROTOCOL_ENGINE_HARDWARE__MOVE_DELAY_MS=0
//! PROTOCOL_ENGINE_SCRIPTING__MAX_OPERATIONS=500000
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let config = EngineConfig::load_from("demos/protocol-engine.toml")?;
//! logging::init_from_config(&config)?;
//! let (runner, _hardware) = create_simulating_runner(&config);
//! ```

use crate::scripting::DEFAULT_MAX_OPERATIONS;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PROTOCOL_ENGINE_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub application: ApplicationConfig,
    pub hardware: HardwareConfig,
    pub scripting: ScriptingConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
}

/// Simulated hardware and hardware worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Capacity of the hardware worker's request channel
    pub request_capacity: usize,
    /// Simulated duration of every gantry move
    pub move_delay_ms: u64,
    /// Highest reachable z for the attached instruments, in deck coordinates
    pub max_travel_height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Operation budget for a single script run
    pub max_operations: u64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "protocol-engine".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            request_capacity: 32,
            move_delay_ms: 5,
            max_travel_height: crate::hardware::simulator::DEFAULT_MAX_HEIGHT,
        }
    }
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl EngineConfig {
    /// Defaults overlaid with environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::figment())
    }

    /// Defaults, then the TOML file at `path`, then environment variables.
    ///
    /// A missing file is not an error; Figment treats it as empty.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// The default provider stack without a file.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.hardware.request_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "hardware.request_capacity must be at least 1".to_string(),
            ));
        }

        if !self.hardware.max_travel_height.is_finite() || self.hardware.max_travel_height <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid hardware.max_travel_height {}. Must be a positive number",
                self.hardware.max_travel_height
            )));
        }

        if self.scripting.max_operations == 0 {
            return Err(ConfigError::ValidationError(
                "scripting.max_operations must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
