//! Error types for configuration handling

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading a tree configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for [`Config`](super::Config).
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A field (from the file or an `MT_` override) holds an unusable value.
    #[error("Invalid value for '{field}': '{value}'. {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a new invalid value error.
    pub fn invalid_value<S1, S2, S3>(field: S1, value: S2, reason: S3) -> Self
    where
        S1: Into<String>,
        S2: std::fmt::Display,
        S3: Into<String>,
    {
        ConfigError::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
