// src/query/types.rs
use serde::Serialize;

use crate::core::hash::NodeHasher;
use crate::core::node::NodeValue;
use crate::error::Result;

/// A leaf addressed by its insertion-order index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaf {
    pub leaf_index: u64,
    pub value: NodeValue,
}

/// Inclusion proof of one leaf against the root it was read with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub leaf_index: u64,
    pub leaf_value: NodeValue,
    /// Sibling values from the leaf level up to the root's children.
    pub siblings: Vec<NodeValue>,
    pub root: NodeValue,
}

impl MerkleProof {
    /// Recompute the root from the leaf and its siblings.
    pub fn verify(&self, hasher: &dyn NodeHasher) -> Result<bool> {
        verify_sibling_path(hasher, self.leaf_index, &self.leaf_value, &self.siblings, &self.root)
    }
}

/// Hash `leaf_value` up through `siblings` and compare with `root`.
///
/// Bit `k` of `leaf_index` says whether the running value is the right
/// child at level `k` above the leaves.
pub fn verify_sibling_path(
    hasher: &dyn NodeHasher,
    leaf_index: u64,
    leaf_value: &NodeValue,
    siblings: &[NodeValue],
    root: &NodeValue,
) -> Result<bool> {
    if siblings.len() < 64 && leaf_index >> siblings.len() != 0 {
        return Ok(false);
    }
    let mut current = leaf_value.clone();
    let mut position = leaf_index;
    for sibling in siblings {
        current = if position & 1 == 0 {
            hasher.hash(current.as_bytes(), sibling.as_bytes())?
        } else {
            hasher.hash(sibling.as_bytes(), current.as_bytes())?
        };
        position >>= 1;
    }
    Ok(&current == root)
}
