// src/core/node.rs

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::HashType;
use crate::error::{MTError, Result};

/// A node value: a fixed-length byte string.
///
/// Serialized as a `0x`-prefixed hex string, which is also the persisted and
/// wire representation of leaf values.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeValue(Vec<u8>);

impl NodeValue {
    /// Wrap raw bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        NodeValue(bytes)
    }

    /// The all-zero value of the given length.
    pub fn zero(len: usize) -> Self {
        NodeValue(vec![0u8; len])
    }

    /// Parse a hex string, with or without a `0x` prefix.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let trimmed = hex_str.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        Ok(NodeValue(hex::decode(digits)?))
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the value has no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Fail with `Validation` unless the value is exactly `expected` bytes long.
    pub fn check_len(&self, expected: usize, what: &str) -> Result<()> {
        if self.len() != expected {
            return Err(MTError::validation(format!(
                "{} must be {} bytes, got {} ({})",
                what,
                expected,
                self.len(),
                self.to_hex()
            )));
        }
        Ok(())
    }
}

impl From<Vec<u8>> for NodeValue {
    fn from(bytes: Vec<u8>) -> Self {
        NodeValue(bytes)
    }
}

impl From<&[u8]> for NodeValue {
    fn from(bytes: &[u8]) -> Self {
        NodeValue(bytes.to_vec())
    }
}

impl AsRef<[u8]> for NodeValue {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeValue({})", self.to_hex())
    }
}

impl Serialize for NodeValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NodeValue::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A stored tree node, persisted as `{nodeIndex, value}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Level-order position.
    pub node_index: u64,
    /// Node value (hash, or the leaf value on the final level).
    pub value: NodeValue,
}

impl Node {
    /// Creates a node.
    pub fn new(node_index: u64, value: NodeValue) -> Self {
        Self { node_index, value }
    }
}

/// Immutable per-deployment description of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeMetadata {
    height: u8,
    hash_type: HashType,
    leaf_hash_length: usize,
    zero: NodeValue,
}

impl TreeMetadata {
    /// Build metadata; `ZERO` is derived from the node hash length.
    pub fn new(height: u8, hash_type: HashType, leaf_hash_length: usize, node_hash_length: usize) -> Self {
        Self {
            height,
            hash_type,
            leaf_hash_length,
            zero: NodeValue::zero(node_hash_length),
        }
    }

    /// `TREE_HEIGHT`
    pub fn height(&self) -> u8 {
        self.height
    }

    /// `HASH_TYPE`
    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    /// `LEAF_HASHLENGTH`
    pub fn leaf_hash_length(&self) -> usize {
        self.leaf_hash_length
    }

    /// `NODE_HASHLENGTH`
    pub fn node_hash_length(&self) -> usize {
        self.zero.len()
    }

    /// `ZERO`
    pub fn zero(&self) -> &NodeValue {
        &self.zero
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_with_and_without_prefix() {
        let v = NodeValue::from_hex("0xdeadbeef").unwrap();
        assert_eq!(v.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(v.to_hex(), "0xdeadbeef");
        assert_eq!(NodeValue::from_hex("DEADBEEF").unwrap(), v);
        assert!(NodeValue::from_hex("0xabc").is_err());
        assert!(NodeValue::from_hex("0xzz").is_err());
    }

    #[test]
    fn test_zero_and_length_checks() {
        let zero = NodeValue::zero(27);
        assert!(zero.is_zero());
        assert_eq!(zero.len(), 27);
        assert!(zero.check_len(27, "node").is_ok());
        assert!(matches!(zero.check_len(32, "leaf"), Err(MTError::Validation(_))));
    }

    #[test]
    fn test_node_persisted_layout() {
        let node = Node::new(7, NodeValue::new(vec![1, 2]));
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, r#"{"nodeIndex":7,"value":"0x0102"}"#);
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_metadata_derives_zero() {
        let meta = TreeMetadata::new(32, HashType::Sha, 32, 27);
        assert_eq!(meta.zero(), &NodeValue::zero(27));
        assert_eq!(meta.node_hash_length(), 27);
        assert_eq!(meta.leaf_hash_length(), 32);
    }
}
