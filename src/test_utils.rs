// src/test_utils.rs

//! Shared helpers for unit and integration tests.

use std::collections::BTreeMap;

use crate::config::{Config, HashType, StorageType};
use crate::core::hash::NodeHasher;
use crate::core::index::PathResolver;
use crate::core::node::{NodeValue, TreeMetadata};
use crate::error::Result;

/// One-byte toy hash: `H(a, b) = (a + b) mod 256`, with `ZERO = 0x00`.
///
/// Makes expected roots computable by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdditiveHasher;

impl NodeHasher for AdditiveHasher {
    fn output_len(&self) -> usize {
        1
    }

    fn hash(&self, left: &[u8], right: &[u8]) -> Result<NodeValue> {
        let sum = left
            .iter()
            .chain(right.iter())
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        Ok(NodeValue::new(vec![sum]))
    }
}

/// Metadata for a tree of one-byte leaves and nodes, paired with [`AdditiveHasher`].
pub fn additive_metadata(height: u8) -> TreeMetadata {
    TreeMetadata::new(height, HashType::Sha, 1, 1)
}

/// In-memory configuration with the given height and leaf length.
pub fn memory_config(height: u8, leaf_hash_length: usize) -> Config {
    let mut config = Config::default();
    config.tree.height = height;
    config.tree.leaf_hash_length = leaf_hash_length;
    config.storage.storage_type = StorageType::Memory;
    config.storage.base_path = String::new();
    config
}

/// Root of a tree holding exactly `leaves`, computed by plain recursion
/// from the definition: empty subtrees are `zero`, others hash their children.
///
/// Panics on an invalid height or a failing hasher.
pub fn reference_root(
    height: u8,
    leaves: &BTreeMap<u64, NodeValue>,
    hasher: &dyn NodeHasher,
    zero: &NodeValue,
) -> NodeValue {
    fn subtree(
        resolver: &PathResolver,
        node: u64,
        leaves: &BTreeMap<u64, NodeValue>,
        hasher: &dyn NodeHasher,
        zero: &NodeValue,
    ) -> NodeValue {
        let (first, last) = resolver.leaf_span(node).expect("node within tree");
        if leaves.range(first..=last).next().is_none() {
            return zero.clone();
        }
        if resolver.is_leaf_node(node) {
            return leaves[&first].clone();
        }
        let (l, r) = PathResolver::children(node);
        let left = subtree(resolver, l, leaves, hasher, zero);
        let right = subtree(resolver, r, leaves, hasher, zero);
        hasher
            .hash(left.as_bytes(), right.as_bytes())
            .expect("reference hash")
    }

    let resolver = PathResolver::new(height).expect("valid tree height");
    subtree(&resolver, 0, leaves, hasher, zero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MTError;

    #[derive(Debug)]
    struct FailingHasher;

    impl NodeHasher for FailingHasher {
        fn output_len(&self) -> usize {
            1
        }

        fn hash(&self, _left: &[u8], _right: &[u8]) -> Result<NodeValue> {
            Err(MTError::hashing("unavailable"))
        }
    }

    #[test]
    fn test_reference_root_additive() {
        let leaves: BTreeMap<u64, NodeValue> =
            [(0, NodeValue::new(vec![1])), (3, NodeValue::new(vec![4]))].into();
        let zero = NodeValue::new(vec![0]);
        assert_eq!(reference_root(2, &leaves, &AdditiveHasher, &zero), NodeValue::new(vec![5]));
        assert_eq!(reference_root(2, &BTreeMap::new(), &AdditiveHasher, &zero), zero);
    }

    #[test]
    #[should_panic(expected = "reference hash")]
    fn test_reference_root_surfaces_hash_failure() {
        let leaves: BTreeMap<u64, NodeValue> = [(0, NodeValue::new(vec![1]))].into();
        reference_root(2, &leaves, &FailingHasher, &NodeValue::new(vec![0]));
    }
}
