//! Configuration management for the Merkle tree sync service
//!
//! This module handles loading, validating, and providing access to the
//! service configuration. It supports loading configuration from TOML files,
//! environment variables, and programmatic overrides. The tree-shaping part of
//! the configuration is frozen into a [`TreeMetadata`] value at construction
//! time and handed to the engine explicitly.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod types;
pub mod validation;

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod validation_tests;

#[cfg(test)]
#[path = "tests/config_mod_tests.rs"]
mod config_mod_tests;

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::core::node::TreeMetadata;

/// Re-export the error type
pub use error::ConfigError;
pub use types::{HashType, LogLevel, StorageType};

/// The environment variable prefix for configuration overrides
const ENV_PREFIX: &str = "MT_";

/// The application name used for finding config directories
const APP_NAME: &str = "merkle-tree-sync";

/// Main configuration structure for the Merkle tree sync service.
///
/// # Example
///
/// ```no_run
/// use merkle_tree_sync::config::Config;
///
/// // A missing file falls back to the built-in defaults.
/// let config = Config::load("path/that/hopefully/does/not/exist.toml").unwrap();
/// assert_eq!(config.tree.height, 32);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Tree shape and hashing
    pub tree: TreeConfig,
    /// Leaf feed ingestion
    pub ingestion: IngestionConfig,
    /// Root/watermark tracking and lag auditing
    pub tracker: TrackerConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Tree configuration (`TREE_HEIGHT`, `HASH_TYPE`, `LEAF_HASHLENGTH`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeConfig {
    /// Number of levels below the root; the tree holds `2^height` leaves
    pub height: u8,
    /// Hash function used for every non-leaf node
    pub hash_type: HashType,
    /// Expected byte length of leaf values arriving from the feed
    pub leaf_hash_length: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            height: 32,
            hash_type: HashType::Sha,
            leaf_hash_length: 32,
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestionConfig {
    /// Maximum number of out-of-order leaves held while waiting for a gap to close
    pub buffer_size: usize,
    /// Maximum number of leaves propagated and committed as one batch
    pub batch_size: usize,
    /// Capacity of the bounded channel feeding the ingestion task
    pub channel_capacity: usize,
    /// How many times a batch is retried after a storage or hashing failure
    pub max_retries: u32,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            batch_size: 1000,
            channel_capacity: 256,
            max_retries: 3,
        }
    }
}

/// Root/watermark tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    /// Number of recent `(watermark, root)` checkpoints kept for auditing
    pub history_len: usize,
    /// Number of leaves the local tree may trail the external source before a lag warning
    pub lag_tolerance: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_len: 64,
            lag_tolerance: 5,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Storage type
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Base path for file storage (ignored for memory storage)
    pub base_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::File,
            base_path: "./data".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Whether to log to console
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
        }
    }
}

impl Config {
    /// Loads the configuration from the specified path.
    ///
    /// A missing file falls back to built-in defaults. Environment variables
    /// with the `MT_` prefix are applied on top, then the result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or
    /// parsed, if an environment override is malformed, or if validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let mut config = match fs::read_to_string(path) {
            Ok(config_str) => {
                toml::from_str::<Config>(&config_str).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Config file not found at {}, using defaults", path.display());
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        config.apply_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// Environment variables are prefixed with `MT_` and use `_` as a
    /// separator, e.g. `MT_TREE_HEIGHT=20` or `MT_LOGGING_LEVEL=debug`.
    ///
    /// # Errors
    ///
    /// Returns an error if any recognised environment variable cannot be parsed.
    pub fn apply_env_vars(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match stripped.to_lowercase().as_str() {
                "tree_height" => self.tree.height = parse_env("tree.height", value)?,
                "hash_type" => self.tree.hash_type = parse_env("tree.hash_type", value)?,
                "leaf_hash_length" => {
                    self.tree.leaf_hash_length = parse_env("tree.leaf_hash_length", value)?
                }
                "ingestion_buffer_size" => {
                    self.ingestion.buffer_size = parse_env("ingestion.buffer_size", value)?
                }
                "ingestion_batch_size" => {
                    self.ingestion.batch_size = parse_env("ingestion.batch_size", value)?
                }
                "tracker_lag_tolerance" => {
                    self.tracker.lag_tolerance = parse_env("tracker.lag_tolerance", value)?
                }
                "storage_type" => {
                    self.storage.storage_type = parse_env("storage.type", value)?
                }
                "storage_base_path" => self.storage.base_path = value.to_string(),
                "logging_level" => self.logging.level = parse_env("logging.level", value)?,
                _ => {}
            }
        }

        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }

    /// The immutable per-deployment tree description derived from this configuration.
    pub fn tree_metadata(&self) -> TreeMetadata {
        TreeMetadata::new(
            self.tree.height,
            self.tree.hash_type,
            self.tree.leaf_hash_length,
            self.tree.hash_type.node_hash_length(),
        )
    }

    /// Returns the path to the directory where configuration files should be stored.
    ///
    /// This is OS-specific:
    /// - Linux: `$HOME/.config/merkle-tree-sync`
    /// - macOS: `$HOME/Library/Application Support/com.cogs.merkle-tree-sync`
    /// - Windows: `%APPDATA%\\cogs\\merkle-tree-sync`
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "cogs", APP_NAME)
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid_value(field, value, "Cannot parse environment override"))
}
