//! Configuration validation for the Merkle tree sync service
//!
//! This module contains functions for validating the configuration so that
//! every value is within an acceptable range before the tree engine is built.

use std::path::Path;

use super::error::ConfigError;
use super::{Config, IngestionConfig, StorageConfig, StorageType, TrackerConfig, TreeConfig};
use crate::core::index::MAX_TREE_HEIGHT;

/// Validates the whole configuration.
///
/// # Errors
///
/// Returns a `ConfigError` for the first failing check.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    validate_tree_config(&config.tree)?;
    validate_ingestion_config(&config.ingestion)?;
    validate_tracker_config(&config.tracker)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates the tree configuration.
fn validate_tree_config(config: &TreeConfig) -> Result<(), ConfigError> {
    if config.height == 0 || config.height > MAX_TREE_HEIGHT {
        return Err(ConfigError::invalid_value(
            "tree.height",
            config.height,
            format!("Tree height must be between 1 and {}", MAX_TREE_HEIGHT),
        ));
    }

    if config.leaf_hash_length == 0 {
        return Err(ConfigError::invalid_value(
            "tree.leaf_hash_length",
            config.leaf_hash_length,
            "Leaf values must be at least one byte long",
        ));
    }

    Ok(())
}

/// Validates the ingestion configuration.
fn validate_ingestion_config(config: &IngestionConfig) -> Result<(), ConfigError> {
    if config.batch_size == 0 {
        return Err(ConfigError::invalid_value(
            "ingestion.batch_size",
            config.batch_size,
            "batch_size must be greater than 0",
        ));
    }

    if config.buffer_size == 0 {
        return Err(ConfigError::invalid_value(
            "ingestion.buffer_size",
            config.buffer_size,
            "buffer_size must be greater than 0",
        ));
    }

    if config.channel_capacity == 0 {
        return Err(ConfigError::invalid_value(
            "ingestion.channel_capacity",
            config.channel_capacity,
            "channel_capacity must be greater than 0",
        ));
    }

    if config.max_retries > 100 {
        log::warn!(
            "High value for ingestion.max_retries ({}). A failing store will stall ingestion for a long time.",
            config.max_retries
        );
    }

    Ok(())
}

/// Validates the tracker configuration.
fn validate_tracker_config(config: &TrackerConfig) -> Result<(), ConfigError> {
    if config.history_len == 0 {
        return Err(ConfigError::invalid_value(
            "tracker.history_len",
            config.history_len,
            "history_len must be greater than 0",
        ));
    }
    Ok(())
}

/// Validates the storage configuration.
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.storage_type != StorageType::File {
        return Ok(());
    }

    if config.base_path.is_empty() {
        return Err(ConfigError::invalid_value(
            "storage.base_path",
            "",
            "Base path cannot be empty for file storage",
        ));
    }

    let base_path = Path::new(&config.base_path);
    match std::fs::metadata(base_path) {
        Ok(metadata) if !metadata.is_dir() => Err(ConfigError::invalid_value(
            "storage.base_path",
            base_path.display(),
            "Base path must be a directory",
        )),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // The store creates the directory on open; only the parent has to exist.
            match base_path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                    Err(ConfigError::invalid_value(
                        "storage.base_path",
                        base_path.display(),
                        "Parent directory does not exist",
                    ))
                }
                _ => Ok(()),
            }
        }
        Err(e) => Err(ConfigError::invalid_value(
            "storage.base_path",
            base_path.display(),
            format!("Error accessing path: {}", e),
        )),
    }
}
