// src/query/engine.rs
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::try_join_all;

use crate::core::hash::NodeHasher;
use crate::core::index::PathResolver;
use crate::core::node::{Node, NodeValue, TreeMetadata};
use crate::error::Result;
use crate::query::types::{Leaf, MerkleProof};
use crate::storage::NodeStore;

/// Read-only view of a tree.
///
/// Every method reads committed state only and never writes. An in-range
/// node that was never written reads as `ZERO`.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Arc<dyn NodeStore>,
    metadata: Arc<TreeMetadata>,
    resolver: PathResolver,
    hasher: Arc<dyn NodeHasher>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn NodeStore>, metadata: TreeMetadata, hasher: Arc<dyn NodeHasher>) -> Result<Self> {
        Ok(Self {
            resolver: PathResolver::new(metadata.height())?,
            metadata: Arc::new(metadata),
            store,
            hasher,
        })
    }

    fn zero(&self) -> NodeValue {
        self.metadata.zero().clone()
    }

    pub fn get_metadata(&self) -> &TreeMetadata {
        &self.metadata
    }

    pub fn hasher(&self) -> &Arc<dyn NodeHasher> {
        &self.hasher
    }

    /// Value at `node_index`; `OutOfRange` past `2^(height+1) - 2`.
    pub async fn get_node(&self, node_index: u64) -> Result<NodeValue> {
        self.resolver.check_node(node_index)?;
        Ok(self
            .store
            .get_node(node_index)
            .await?
            .unwrap_or_else(|| self.zero()))
    }

    pub async fn get_leaf(&self, leaf_index: u64) -> Result<NodeValue> {
        let node_index = self.resolver.leaf_to_node(leaf_index)?;
        self.get_node(node_index).await
    }

    pub async fn get_root(&self) -> Result<NodeValue> {
        self.get_node(0).await
    }

    /// Leaf indices holding `value`; empty if none.
    pub async fn get_leaves_by_value(&self, value: &NodeValue) -> Result<BTreeSet<u64>> {
        self.store
            .get_nodes_by_value(value)
            .await?
            .into_iter()
            .filter(|n| self.resolver.is_leaf_node(n.node_index))
            .map(|n| self.resolver.node_to_leaf(n.node_index))
            .collect()
    }

    /// Written leaves with `min_leaf <= leafIndex <= max_leaf`, ascending.
    pub async fn get_leaves_in_range(&self, min_leaf: u64, max_leaf: u64) -> Result<Vec<Leaf>> {
        let first = self.resolver.leaf_to_node(min_leaf)?;
        let last = self.resolver.leaf_to_node(max_leaf)?;
        self.store
            .get_nodes_in_range(first, last)
            .await?
            .into_iter()
            .map(|n| {
                Ok(Leaf {
                    leaf_index: self.resolver.node_to_leaf(n.node_index)?,
                    value: n.value,
                })
            })
            .collect()
    }

    /// Number of applied leaves.
    pub async fn count_leaves(&self) -> Result<u64> {
        self.store.load_leaf_count().await
    }

    pub async fn count_nodes(&self) -> Result<u64> {
        self.store.count_nodes().await
    }

    /// Stored nodes with `min_index <= nodeIndex <= max_index`, ascending.
    /// `max_index` is clamped to the last node of the tree.
    pub async fn get_nodes_in_range(&self, min_index: u64, max_index: u64) -> Result<Vec<Node>> {
        self.resolver.check_node(min_index)?;
        let max_index = max_index.min(self.resolver.max_node_index());
        self.store.get_nodes_in_range(min_index, max_index).await
    }

    pub async fn get_nodes_by_value(&self, value: &NodeValue) -> Result<Vec<Node>> {
        self.store.get_nodes_by_value(value).await
    }

    /// One node per requested index, in request order, `ZERO` where unwritten.
    pub async fn get_nodes_by_indices(&self, node_indices: &[u64]) -> Result<Vec<Node>> {
        for index in node_indices {
            self.resolver.check_node(*index)?;
        }
        let stored: BTreeMap<u64, NodeValue> = self
            .store
            .get_nodes(node_indices)
            .await?
            .into_iter()
            .map(|n| (n.node_index, n.value))
            .collect();
        Ok(node_indices
            .iter()
            .map(|i| Node::new(*i, stored.get(i).cloned().unwrap_or_else(|| self.zero())))
            .collect())
    }

    /// Stored nodes matching any of `values`, ascending by index.
    pub async fn get_nodes_by_values(&self, values: &[NodeValue]) -> Result<Vec<Node>> {
        let lookups = values.iter().map(|v| self.store.get_nodes_by_value(v));
        let mut nodes: Vec<Node> = try_join_all(lookups).await?.into_iter().flatten().collect();
        nodes.sort_by_key(|n| n.node_index);
        nodes.dedup_by_key(|n| n.node_index);
        Ok(nodes)
    }

    /// Sibling values from the leaf level up to the root's children.
    pub async fn get_sibling_path(&self, leaf_index: u64) -> Result<Vec<NodeValue>> {
        Ok(self.get_proof(leaf_index).await?.siblings)
    }

    /// Leaf value, siblings and root, all from one store read.
    pub async fn get_proof(&self, leaf_index: u64) -> Result<MerkleProof> {
        let leaf_node = self.resolver.leaf_to_node(leaf_index)?;
        let sibling_nodes = self.resolver.sibling_path(leaf_index)?;

        let mut wanted = sibling_nodes.clone();
        wanted.push(leaf_node);
        wanted.push(0);
        let stored: BTreeMap<u64, NodeValue> = self
            .store
            .get_nodes(&wanted)
            .await?
            .into_iter()
            .map(|n| (n.node_index, n.value))
            .collect();
        let value_of = |i: u64| stored.get(&i).cloned().unwrap_or_else(|| self.zero());

        Ok(MerkleProof {
            leaf_index,
            leaf_value: value_of(leaf_node),
            siblings: sibling_nodes.into_iter().map(value_of).collect(),
            root: value_of(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::propagation::HashPropagator;
    use crate::error::MTError;
    use crate::query::types::verify_sibling_path;
    use crate::storage::MemoryNodeStore;
    use crate::test_utils::{additive_metadata, AdditiveHasher};
    use assert_matches::assert_matches;

    fn v(byte: u8) -> NodeValue {
        NodeValue::new(vec![byte])
    }

    async fn engine_with(height: u8, leaves: &[u8]) -> QueryEngine {
        let store = Arc::new(MemoryNodeStore::new());
        let meta = additive_metadata(height);
        let propagator = HashPropagator::new(&meta, Arc::new(AdditiveHasher)).unwrap();
        let batch: BTreeMap<u64, NodeValue> = leaves.iter().enumerate().map(|(i, b)| (i as u64, v(*b))).collect();
        propagator
            .propagate(store.as_ref(), &batch, Some(leaves.len() as u64))
            .await
            .unwrap();
        QueryEngine::new(store, meta, Arc::new(AdditiveHasher)).unwrap()
    }

    #[tokio::test]
    async fn test_get_node_zero_and_out_of_range() {
        let q = engine_with(2, &[1]).await;
        assert_eq!(q.get_node(3).await.unwrap(), v(1));
        assert_eq!(q.get_node(6).await.unwrap(), v(0));
        assert_matches!(q.get_node(7).await, Err(MTError::OutOfRange { .. }));
        assert_eq!(q.get_root().await.unwrap(), v(1));
        assert_matches!(q.get_leaf(4).await, Err(MTError::OutOfRange { .. }));
    }

    #[tokio::test]
    async fn test_reverse_lookup_only_returns_leaves() {
        // leaf 0 = 1 and its ancestors also hash to 1
        let q = engine_with(2, &[1, 0, 1]).await;
        assert_eq!(q.get_leaves_by_value(&v(1)).await.unwrap(), BTreeSet::from([0, 2]));
        assert!(q.get_leaves_by_value(&v(42)).await.unwrap().is_empty());
        let nodes = q.get_nodes_by_value(&v(1)).await.unwrap();
        assert!(nodes.iter().any(|n| n.node_index == 2));
    }

    #[tokio::test]
    async fn test_leaf_and_node_listings() {
        let q = engine_with(3, &[1, 2, 3]).await;
        let leaves = q.get_leaves_in_range(1, 5).await.unwrap();
        assert_eq!(
            leaves,
            vec![
                Leaf { leaf_index: 1, value: v(2) },
                Leaf { leaf_index: 2, value: v(3) }
            ]
        );
        assert_eq!(q.count_leaves().await.unwrap(), 3);
        assert_eq!(q.count_nodes().await.unwrap(), 3 + 2 + 1 + 1);

        let by_index = q.get_nodes_by_indices(&[9, 14, 0]).await.unwrap();
        assert_eq!(by_index, vec![Node::new(9, v(3)), Node::new(14, v(0)), Node::new(0, v(6))]);
        assert_matches!(q.get_nodes_by_indices(&[15]).await, Err(MTError::OutOfRange { .. }));

        let by_values = q.get_nodes_by_values(&[v(3), v(2), v(3)]).await.unwrap();
        let indices: Vec<u64> = by_values.iter().map(|n| n.node_index).collect();
        assert_eq!(indices, vec![3, 4, 8, 9]);

        let range = q.get_nodes_in_range(7, 1_000).await.unwrap();
        assert_eq!(range.len(), 3);
    }

    #[tokio::test]
    async fn test_sibling_path_reconstructs_root() {
        let q = engine_with(3, &[4, 9, 13, 7, 200]).await;
        let root = q.get_root().await.unwrap();
        for leaf in 0..5u64 {
            let proof = q.get_proof(leaf).await.unwrap();
            assert_eq!(proof.root, root);
            assert_eq!(proof.siblings.len(), 3);
            assert!(proof.verify(&AdditiveHasher).unwrap());
            assert_eq!(q.get_sibling_path(leaf).await.unwrap(), proof.siblings);
        }
    }

    #[test]
    fn test_verify_rejects_tampered_path() {
        let h = AdditiveHasher;
        let siblings = vec![v(2), v(0)];
        assert!(verify_sibling_path(&h, 0, &v(1), &siblings, &v(3)).unwrap());
        assert!(!verify_sibling_path(&h, 0, &v(1), &siblings, &v(4)).unwrap());
        assert!(!verify_sibling_path(&h, 4, &v(1), &siblings, &v(3)).unwrap());
    }
}
