//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over `application.log_level` so a single run
//! can be made noisier without touching the config file.

use crate::config::EngineConfig;
use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` if set and valid, otherwise the configured level.
pub fn env_filter(config: &EngineConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.application.log_level.as_str()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_from_config(config: &EngineConfig) -> anyhow::Result<()> {
    let filter = env_filter(config);
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = match config.application.log_format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
