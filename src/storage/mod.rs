// src/storage/mod.rs

//! Node persistence.
//!
//! The engine only ever talks to a [`NodeStore`]: a sparse key-value map
//! keyed by node index with a range scan, a reverse index on value, and a
//! persisted leaf counter. Writes happen exclusively through [`WriteBatch`],
//! which a store must apply atomically.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, StorageType};
use crate::core::node::{Node, NodeValue, TreeMetadata};
use crate::error::MTError;

#[cfg(feature = "file-storage")]
pub mod file;
pub mod memory;

#[cfg(feature = "file-storage")]
pub use file::FileNodeStore;
pub use memory::MemoryNodeStore;

/// A set of node writes and deletes committed as one unit, together with the
/// new persisted leaf count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    puts: BTreeMap<u64, NodeValue>,
    deletes: BTreeSet<u64>,
    leaf_count: Option<u64>,
}

impl WriteBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write; cancels an earlier delete of the same index.
    pub fn put(&mut self, node_index: u64, value: NodeValue) -> &mut Self {
        self.deletes.remove(&node_index);
        self.puts.insert(node_index, value);
        self
    }

    /// Stage a delete; cancels an earlier write of the same index.
    pub fn delete(&mut self, node_index: u64) -> &mut Self {
        self.puts.remove(&node_index);
        self.deletes.insert(node_index);
        self
    }

    /// Record the leaf count (watermark + 1) to persist with this batch.
    pub fn set_leaf_count(&mut self, leaf_count: u64) -> &mut Self {
        self.leaf_count = Some(leaf_count);
        self
    }

    /// Staged writes, ordered by node index.
    pub fn puts(&self) -> &BTreeMap<u64, NodeValue> {
        &self.puts
    }

    /// Staged deletes.
    pub fn deletes(&self) -> &BTreeSet<u64> {
        &self.deletes
    }

    /// Leaf count to persist, if this batch moves it.
    pub fn leaf_count(&self) -> Option<u64> {
        self.leaf_count
    }

    /// Whether a staged write or delete touches `node_index`.
    pub fn touches(&self, node_index: u64) -> bool {
        self.puts.contains_key(&node_index) || self.deletes.contains(&node_index)
    }

    /// Nothing staged at all.
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty() && self.leaf_count.is_none()
    }
}

/// Persistence capability consumed by the tree engine.
///
/// Only explicitly written nodes are stored; absence means `ZERO`. All reads
/// observe the last fully committed batch.
#[async_trait]
pub trait NodeStore: Send + Sync + std::fmt::Debug {
    /// Value stored at `node_index`, if any.
    async fn get_node(&self, node_index: u64) -> Result<Option<NodeValue>, MTError>;

    /// The stored subset of `node_indices`, in ascending index order, read from one snapshot.
    async fn get_nodes(&self, node_indices: &[u64]) -> Result<Vec<Node>, MTError>;

    /// Stored nodes with `min_index <= nodeIndex <= max_index`, ascending.
    async fn get_nodes_in_range(&self, min_index: u64, max_index: u64) -> Result<Vec<Node>, MTError>;

    /// Stored nodes whose value equals `value`, ascending by index.
    async fn get_nodes_by_value(&self, value: &NodeValue) -> Result<Vec<Node>, MTError>;

    /// Number of stored nodes.
    async fn count_nodes(&self) -> Result<u64, MTError>;

    /// Persisted leaf count (watermark + 1); 0 for an empty tree.
    async fn load_leaf_count(&self) -> Result<u64, MTError>;

    /// Apply every write, delete and the leaf count of `batch` atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), MTError>;

    /// Write a single node.
    async fn put_node(&self, node: Node) -> Result<(), MTError> {
        let mut batch = WriteBatch::new();
        batch.put(node.node_index, node.value);
        self.commit(batch).await
    }
}

/// Create the store selected by `config.storage`, pinned to `metadata`.
pub async fn create_node_store(
    config: &Config,
    metadata: &TreeMetadata,
) -> Result<Arc<dyn NodeStore>, MTError> {
    match config.storage.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryNodeStore::new())),
        #[cfg(feature = "file-storage")]
        StorageType::File => {
            let store = FileNodeStore::open(&config.storage.base_path, metadata).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "file-storage"))]
        StorageType::File => {
            let _ = metadata;
            Err(MTError::invalid_input(
                "file storage requires the 'file-storage' feature",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_put_then_delete_cancels() {
        let mut batch = WriteBatch::new();
        batch.put(3, NodeValue::new(vec![1]));
        batch.delete(3);
        assert!(batch.puts().is_empty());
        assert!(batch.deletes().contains(&3));
        batch.put(3, NodeValue::new(vec![2]));
        assert!(batch.deletes().is_empty());
        assert!(batch.touches(3));
        assert!(!batch.touches(4));
    }

    #[test]
    fn test_empty_batch() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());
        batch.set_leaf_count(0);
        assert!(!batch.is_empty());
    }

    #[tokio::test]
    async fn test_create_memory_store() {
        let mut config = Config::default();
        config.storage.storage_type = StorageType::Memory;
        let store = create_node_store(&config, &config.tree_metadata()).await.unwrap();
        assert_eq!(store.count_nodes().await.unwrap(), 0);
    }
}
