// src/lib.rs

//! A sparse, fixed-height binary Merkle tree kept in sync with an ordered
//! on-chain leaf-append feed.
//!
//! Leaves arrive as `{leafIndex, leafValue}` or `{minLeafIndex, leafValues}`
//! notifications. The [`ingest`] service applies them in index order,
//! buffering out-of-order arrivals and rejecting conflicting re-deliveries;
//! [`core::propagation`] recomputes every affected ancestor and commits each
//! batch atomically to a [`storage::NodeStore`]; [`query`] answers node, leaf,
//! root and proof lookups against the committed state.
//!
//! [`api::MerkleTreeService`] ties these together:
//!
//! ```no_run
//! # async fn demo() -> merkle_tree_sync::Result<()> {
//! use merkle_tree_sync::{Config, MerkleTreeService, NodeValue};
//!
//! let service = MerkleTreeService::open(Config::default()).await?;
//! service.insert_leaf(0, NodeValue::new(vec![1; 32])).await?;
//! let root = service.query().get_root().await?;
//! # let _ = root;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod ingest;
pub mod query;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;

pub use crate::api::{MerkleTreeService, SyncTree};
pub use crate::config::{Config, HashType, LogLevel, StorageType};
pub use crate::core::{Node, NodeHasher, NodeValue, PathResolver, TreeMetadata};
pub use crate::error::{ErrorKind, MTError, Result};
pub use crate::ingest::{IngestionHandle, LeafEvent};
pub use crate::query::{MerkleProof, QueryEngine};

use crate::config::LoggingConfig;

/// Builds the logger `config` describes, or `None` when console logging is off.
#[cfg(feature = "logging")]
fn logger_builder(config: &LoggingConfig) -> Option<env_logger::Builder> {
    if !config.console || config.level == LogLevel::Off {
        return None;
    }
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.level.into()).parse_default_env();
    Some(builder)
}

/// Install an `env_logger` logger for `config`.
///
/// Returns `false` if logging is disabled or another logger is already set.
#[cfg(feature = "logging")]
pub fn init_logging(config: &LoggingConfig) -> bool {
    logger_builder(config).map_or(false, |mut builder| builder.try_init().is_ok())
}

#[cfg(not(feature = "logging"))]
pub fn init_logging(_config: &LoggingConfig) -> bool {
    false
}

/// Load configuration (or defaults when `config_path` is `None`), apply `MT_`
/// environment overrides and install the logger it describes.
///
/// Fails with `InvalidInput` if a logger has already been installed.
pub fn init(config_path: Option<&str>) -> Result<Config> {
    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => {
            let mut config = Config::default();
            config.apply_env_vars()?;
            config.validate()?;
            config
        }
    };
    #[cfg(feature = "logging")]
    if let Some(mut builder) = logger_builder(&config.logging) {
        builder
            .try_init()
            .map_err(|e| MTError::InvalidInput(format!("Logger already initialized: {}", e)))?;
    }
    log::info!(
        "Configuration loaded: tree height {}, hash {}, storage {}",
        config.tree.height,
        config.tree.hash_type,
        config.storage.storage_type
    );
    Ok(config)
}
