//! Error types for the Merkle tree sync service
//!
//! This module defines the error types used throughout the crate. The main
//! error type is `MTError`, which carries the domain failures of the tree
//! engine (out-of-range indices, malformed values, conflicting re-deliveries,
//! stalled feeds, storage and hashing failures) alongside the plumbing errors
//! of configuration and I/O.

use thiserror::Error;

/// Main error type for the Merkle tree sync service
#[derive(Error, Debug)]
pub enum MTError {
    /// A leaf or node index lies outside the tree
    #[error("{what} {index} is out of range (limit {limit})")]
    OutOfRange {
        /// What kind of index was rejected ("leaf index", "node index").
        what: &'static str,
        /// The offending index.
        index: u64,
        /// The first index that is no longer valid.
        limit: u64,
    },

    /// A value has the wrong length or encoding
    #[error("Validation error: {0}")]
    Validation(String),

    /// An already-applied (or already-buffered) leaf was re-delivered with a different value
    #[error("Conflicting value for leaf {leaf_index}: stored {existing}, received {received}")]
    Conflict {
        /// The leaf index that was re-delivered.
        leaf_index: u64,
        /// Hex of the value already held.
        existing: String,
        /// Hex of the value just received.
        received: String,
    },

    /// The pending buffer is full while a predecessor leaf is still missing
    #[error("Sync gap: waiting for leaf {missing_leaf}, {pending} entries pending (capacity {capacity})")]
    SyncGap {
        /// The next leaf index the tree needs.
        missing_leaf: u64,
        /// Entries that would be pending if the notification were accepted.
        pending: usize,
        /// Configured buffer capacity.
        capacity: usize,
    },

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Hashing operation failed
    #[error("Hashing error: {0}")]
    HashingError(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error (JSON): {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// TOML serialization/deserialization error
    #[error("Configuration error (TOML): {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    /// The ingestion task is no longer running
    #[error("Ingestion channel closed")]
    ChannelClosed,

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for operations that can fail with a [MTError]
pub type Result<T> = std::result::Result<T, MTError>;

/// Coarse classification of an [MTError], used by callers that map failures
/// onto an outer protocol (HTTP status codes, process exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Index outside `[0, 2^height)` (or the node range).
    OutOfRange,
    /// Malformed value or request.
    Validation,
    /// Re-delivered leaf with a different value.
    Conflict,
    /// Pending buffer exhausted while a gap persists.
    SyncGap,
    /// Persistence layer failure.
    Store,
    /// Hash function failure.
    HashCompute,
    /// Everything else (configuration, channel shutdown).
    Internal,
}

impl ErrorKind {
    /// The HTTP status a REST layer should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::OutOfRange => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::SyncGap => 503,
            ErrorKind::Store => 500,
            ErrorKind::HashCompute => 502,
            ErrorKind::Internal => 500,
        }
    }

    /// A caller-facing message that reveals nothing about internal state.
    pub fn public_message(self) -> &'static str {
        match self {
            ErrorKind::OutOfRange => "index out of range",
            ErrorKind::Validation => "invalid request",
            ErrorKind::Conflict => "conflicting leaf value",
            ErrorKind::SyncGap => "tree sync stalled",
            ErrorKind::Store => "storage unavailable",
            ErrorKind::HashCompute => "hash computation failed",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl MTError {
    /// Create a new out-of-range error for a leaf index
    pub fn leaf_out_of_range(index: u64, limit: u64) -> Self {
        MTError::OutOfRange { what: "leaf index", index, limit }
    }

    /// Create a new out-of-range error for a node index
    pub fn node_out_of_range(index: u64, limit: u64) -> Self {
        MTError::OutOfRange { what: "node index", index, limit }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        MTError::Validation(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        MTError::StorageError(msg.into())
    }

    /// Create a new hashing error
    pub fn hashing<S: Into<String>>(msg: S) -> Self {
        MTError::HashingError(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        MTError::InvalidInput(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MTError::OutOfRange { .. } => ErrorKind::OutOfRange,
            MTError::Validation(_) | MTError::InvalidInput(_) => ErrorKind::Validation,
            MTError::Conflict { .. } => ErrorKind::Conflict,
            MTError::SyncGap { .. } => ErrorKind::SyncGap,
            MTError::StorageError(_) | MTError::Io(_) => ErrorKind::Store,
            MTError::HashingError(_) => ErrorKind::HashCompute,
            MTError::SerdeJson(_)
            | MTError::Toml(_)
            | MTError::ConfigError(_)
            | MTError::ChannelClosed => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same batch may succeed.
    ///
    /// Storage and hashing failures abort a batch without side effects, so the
    /// batch can be replayed. Conflicts and sync gaps need an operator.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Store | ErrorKind::HashCompute)
    }
}

impl From<hex::FromHexError> for MTError {
    fn from(err: hex::FromHexError) -> Self {
        MTError::validation(format!("invalid hex: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_domain_kind_has_distinct_status() {
        let kinds = [
            ErrorKind::OutOfRange,
            ErrorKind::Validation,
            ErrorKind::Conflict,
            ErrorKind::SyncGap,
            ErrorKind::Store,
            ErrorKind::HashCompute,
        ];
        let mut codes: Vec<u16> = kinds.iter().map(|k| k.status_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(MTError::storage("disk full").is_retryable());
        assert!(MTError::hashing("field overflow").is_retryable());
        assert!(!MTError::validation("bad length").is_retryable());
        let conflict = MTError::Conflict {
            leaf_index: 3,
            existing: "0x01".into(),
            received: "0x02".into(),
        };
        assert!(!conflict.is_retryable());
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_out_of_range_message() {
        let err = MTError::leaf_out_of_range(16, 16);
        assert_eq!(err.to_string(), "leaf index 16 is out of range (limit 16)");
        assert_eq!(err.kind().status_code(), 404);
    }

    #[test]
    fn test_hex_error_is_validation() {
        let err: MTError = hex::decode("zz").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
