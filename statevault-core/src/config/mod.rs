//! Configuration management for Statevault
//!
//! Environment-based configuration with defaults and validation. All
//! variables are optional; unset values fall back to the defaults below.
//!
//! Recognized variables:
//! - `STATEVAULT_DATA_DIR` — directory holding all on-disk storage
//! - `STATEVAULT_DB_NAME` — default store name for attached stores
//! - `STATEVAULT_PASSPHRASE` — enables field-level encryption when set
//! - `STATEVAULT_LOG_LEVEL` — level for [`crate::logging`]

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

mod error;

pub use error::ConfigError;

/// Process-level configuration for the persistence layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Directory holding the key-value file, the object-store database and
    /// the schema-version slot
    pub data_dir: PathBuf,

    /// Default store name; the reserved names `local` and `session` select
    /// the simple backend, anything else the versioned object store
    pub db_name: String,

    /// Passphrase for field-level encryption; `None` disables the cipher
    pub passphrase: Option<String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level, parsed by [`LogLevel::parse`]
    pub level: String,
    /// Emit JSON lines
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info.as_str().to_string(),
            json_format: false,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./statevault-data"),
            db_name: "local".to_string(),
            passphrase: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = env::var("STATEVAULT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(name) = env::var("STATEVAULT_DB_NAME") {
            config.db_name = name;
        }
        if let Ok(passphrase) = env::var("STATEVAULT_PASSPHRASE") {
            if !passphrase.is_empty() {
                config.passphrase = Some(passphrase);
            }
        }
        if let Ok(level) = env::var("STATEVAULT_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "data_dir must not be empty".to_string(),
            ));
        }
        if self.db_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "db_name must not be empty".to_string(),
            ));
        }
        if LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "unknown log level: {}",
                self.logging.level
            )));
        }
        Ok(())
    }
}
