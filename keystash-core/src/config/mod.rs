//! Configuration management for keystash
//!
//! Configuration comes from defaults, a TOML file or environment variables
//! and is validated before use.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

mod error;

pub use error::ConfigError;

use crate::keystore::validation::validate_instance_name;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Keystore configuration
    #[serde(default)]
    pub keystore: KeystoreConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Keystore configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    /// Namespace the keystore's records live under
    pub instance_name: String,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind
    pub backend: StorageBackend,

    /// Root directory for the file backend
    pub root_dir: PathBuf,

    /// Byte limit for the backend (unbounded if absent)
    pub capacity_bytes: Option<u64>,

    /// Encrypt objects at rest
    pub encrypted: bool,

    /// Environment variable holding the encryption passphrase
    pub passphrase_env: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            instance_name: "default".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            root_dir: PathBuf::from("./keystore"),
            capacity_bytes: None,
            encrypted: false,
            passphrase_env: "KEYSTASH_PASSPHRASE".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", key, e)))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: KEYSTASH_<SECTION>_<KEY>
    /// Example: KEYSTASH_STORAGE_BACKEND=file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Keystore config
        if let Some(name) = lookup("KEYSTASH_KEYSTORE_INSTANCE_NAME") {
            config.keystore.instance_name = name;
        }

        // Storage config
        if let Some(backend) = lookup("KEYSTASH_STORAGE_BACKEND") {
            config.storage.backend = match backend.to_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "file" => StorageBackend::File,
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "Invalid storage backend: {}",
                        other
                    )))
                }
            };
        }
        if let Some(root_dir) = lookup("KEYSTASH_STORAGE_ROOT_DIR") {
            config.storage.root_dir = PathBuf::from(root_dir);
        }
        if let Some(capacity) = lookup("KEYSTASH_STORAGE_CAPACITY_BYTES") {
            config.storage.capacity_bytes = Some(capacity.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid capacity: {}", e))
            })?);
        }
        if let Some(encrypted) = lookup("KEYSTASH_STORAGE_ENCRYPTED") {
            config.storage.encrypted = parse_bool("encryption flag", &encrypted)?;
        }
        if let Some(var) = lookup("KEYSTASH_STORAGE_PASSPHRASE_ENV") {
            config.storage.passphrase_env = var;
        }

        // Logging config
        if let Some(level) = lookup("KEYSTASH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = lookup("KEYSTASH_LOG_JSON") {
            config.logging.json_format = parse_bool("JSON flag", &json)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate keystore config
        validate_instance_name(&self.keystore.instance_name)
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        // Validate storage config
        if self.storage.capacity_bytes == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "capacity_bytes must be greater than 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::File
            && self.storage.root_dir.as_os_str().is_empty()
        {
            return Err(ConfigError::ValidationFailed(
                "file backend requires root_dir".to_string(),
            ));
        }

        if self.storage.encrypted && self.storage.passphrase_env.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "encryption enabled but passphrase_env is empty".to_string(),
            ));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Read the encryption passphrase from the configured variable
    pub fn passphrase(&self) -> Result<SecretString, ConfigError> {
        env::var(&self.storage.passphrase_env)
            .ok()
            .filter(|p| !p.is_empty())
            .map(SecretString::new)
            .ok_or_else(|| ConfigError::MissingPassphrase(self.storage.passphrase_env.clone()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
