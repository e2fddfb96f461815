//! Type definitions for configuration

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported node hash functions
///
/// The hash type fixes the byte length of every non-leaf node value and of
/// the `ZERO` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    /// SHA-256 over `left || right`, truncated to the right-most 27 bytes
    Sha,
    /// BLAKE3 over `left || right`, full 32 bytes
    Blake3,
}

impl HashType {
    /// Byte length of node values produced by this hash (`NODE_HASHLENGTH`).
    pub fn node_hash_length(self) -> usize {
        match self {
            HashType::Sha => 27,
            HashType::Blake3 => 32,
        }
    }
}

impl Default for HashType {
    fn default() -> Self {
        HashType::Sha
    }
}

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum StorageType {
    /// In-memory storage (not persistent)
    Memory,
    /// File-based storage (persistent)
    File,
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::File
    }
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Logging disabled
    Off,
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}
