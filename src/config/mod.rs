//! Configuration management for subunit-pusher
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. Configuration file, TOML or YAML by extension
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use subunit_pusher::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! let sink = config.load_sink().expect("Failed to load sink configuration");
//! println!("Pulling {} from {}", config.queue.function, config.queue.host);
//! ```
//!
//! # Environment Variables
//!
//! Worker settings use `SUBUNIT_PUSHER__<section>__<key>`, sink settings
//! use `SUBUNIT_SINK__<section>__<key>`.
//!
//! Examples:
//! - `SUBUNIT_PUSHER__QUEUE__HOST=gearman.example.org`
//! - `SUBUNIT_PUSHER__FETCH__REQUEST_TIMEOUT_SECS=60`
//! - `SUBUNIT_SINK__STORAGE__ROOT=/srv/runs`
//!
//! # Configuration File
//!
//! The worker file path comes from `--config`, then `SUBUNIT_PUSHER_CONFIG`,
//! then `config/subunit-pusher.toml`. Its `sink_config` key names the sink
//! file, which must exist.

mod models;
mod sources;
mod validation;

pub use models::{
    Config, FetchConfig, ParserConfig, QueueConfig, SinkConfig, StorageConfig, StorageProvider,
};
pub use sources::config_path;
pub use validation::ValidationError;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Configuration file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("No sink_config configured")]
    NoSinkConfig,
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(&path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load the sink configuration referenced by `sink_config`
    pub fn load_sink(&self) -> Result<SinkConfig, ConfigError> {
        let path = self.sink_config.as_deref().ok_or(ConfigError::NoSinkConfig)?;
        SinkConfig::load_from_path(path)
    }
}

impl SinkConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        let sink = sources::load_sink(path)?;
        validation::validate_sink(&sink)?;
        Ok(sink)
    }
}
