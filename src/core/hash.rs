// src/core/hash.rs

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::config::HashType;
use crate::core::node::NodeValue;
use crate::error::Result;

/// Two-to-one hash used for every non-leaf node.
///
/// Implementations must return exactly [`output_len`](Self::output_len) bytes.
/// A failing implementation (for example a field-native hash that rejects
/// out-of-field inputs) returns `MTError::HashingError`.
pub trait NodeHasher: Send + Sync + fmt::Debug {
    /// Byte length of every value this hasher produces.
    fn output_len(&self) -> usize;

    /// `H(left, right)`
    fn hash(&self, left: &[u8], right: &[u8]) -> Result<NodeValue>;
}

/// SHA-256 of `left || right`, keeping the right-most `output_len` bytes.
#[derive(Debug, Clone, Copy)]
pub struct ShaHasher {
    output_len: usize,
}

impl ShaHasher {
    /// Default output length (`NODE_HASHLENGTH` for the SHA tree).
    pub const DEFAULT_LEN: usize = 27;

    /// Hasher truncating to the default 27 bytes.
    pub fn new() -> Self {
        Self::with_len(Self::DEFAULT_LEN)
    }

    /// Hasher truncating to `output_len` bytes (at most 32).
    pub fn with_len(output_len: usize) -> Self {
        Self {
            output_len: output_len.min(32),
        }
    }
}

impl Default for ShaHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeHasher for ShaHasher {
    fn output_len(&self) -> usize {
        self.output_len
    }

    fn hash(&self, left: &[u8], right: &[u8]) -> Result<NodeValue> {
        let digest = Sha256::new().chain_update(left).chain_update(right).finalize();
        Ok(NodeValue::from(&digest[32 - self.output_len..]))
    }
}

/// BLAKE3 of `left || right`, full 32 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl NodeHasher for Blake3Hasher {
    fn output_len(&self) -> usize {
        32
    }

    fn hash(&self, left: &[u8], right: &[u8]) -> Result<NodeValue> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(left);
        hasher.update(right);
        Ok(NodeValue::from(hasher.finalize().as_bytes().as_slice()))
    }
}

/// The built-in hasher for a configured hash type.
pub fn hasher_for(hash_type: HashType) -> Arc<dyn NodeHasher> {
    match hash_type {
        HashType::Sha => Arc::new(ShaHasher::new()),
        HashType::Blake3 => Arc::new(Blake3Hasher),
    }
}
