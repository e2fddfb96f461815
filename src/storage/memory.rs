// src/storage/memory.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::core::node::{Node, NodeValue};
use crate::error::MTError;
use crate::storage::{NodeStore, WriteBatch};

/// Which commits a [`MemoryNodeStore`] should reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    /// Every commit fails.
    AnyCommit,
    /// Commits touching this node index fail.
    NodeIndex(u64),
    /// Every read fails.
    Reads,
}

/// Sparse node map plus its value index.
///
/// Shared with [`FileNodeStore`](crate::storage::FileNodeStore), which keeps
/// the same in-memory state in front of its journal.
#[derive(Debug, Default)]
pub(crate) struct NodeMap {
    nodes: BTreeMap<u64, NodeValue>,
    by_value: HashMap<NodeValue, BTreeSet<u64>>,
    leaf_count: u64,
}

impl NodeMap {
    pub(crate) fn get(&self, node_index: u64) -> Option<NodeValue> {
        self.nodes.get(&node_index).cloned()
    }

    pub(crate) fn get_many(&self, node_indices: &[u64]) -> Vec<Node> {
        let wanted: BTreeSet<u64> = node_indices.iter().copied().collect();
        wanted
            .into_iter()
            .filter_map(|i| self.nodes.get(&i).map(|v| Node::new(i, v.clone())))
            .collect()
    }

    pub(crate) fn range(&self, min_index: u64, max_index: u64) -> Vec<Node> {
        if min_index > max_index {
            return Vec::new();
        }
        self.nodes
            .range(min_index..=max_index)
            .map(|(i, v)| Node::new(*i, v.clone()))
            .collect()
    }

    pub(crate) fn by_value(&self, value: &NodeValue) -> Vec<Node> {
        self.by_value
            .get(value)
            .map(|indices| indices.iter().map(|i| Node::new(*i, value.clone())).collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> u64 {
        self.nodes.len() as u64
    }

    pub(crate) fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    fn unindex(&mut self, node_index: u64, value: &NodeValue) {
        if let Some(indices) = self.by_value.get_mut(value) {
            indices.remove(&node_index);
            if indices.is_empty() {
                self.by_value.remove(value);
            }
        }
    }

    /// Apply a batch in place. Infallible, so callers hold the write lock
    /// only for the duration of this call.
    pub(crate) fn apply(&mut self, batch: &WriteBatch) {
        for node_index in batch.deletes() {
            if let Some(old) = self.nodes.remove(node_index) {
                self.unindex(*node_index, &old);
            }
        }
        for (node_index, value) in batch.puts() {
            if let Some(old) = self.nodes.insert(*node_index, value.clone()) {
                self.unindex(*node_index, &old);
            }
            self.by_value
                .entry(value.clone())
                .or_default()
                .insert(*node_index);
        }
        if let Some(leaf_count) = batch.leaf_count() {
            self.leaf_count = leaf_count;
        }
    }
}

/// An in-memory node store, primarily for testing or ephemeral use.
///
/// Nodes live in a `BTreeMap` for ordered range scans, with a reverse index
/// on value. A commit swaps the whole batch in under one write lock, so
/// readers see either none or all of it.
///
/// It also includes a mechanism to simulate storage failures for testing
/// error handling paths, configurable via `set_fail_on`.
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeStore {
    state: Arc<RwLock<NodeMap>>,
    fail_on: Arc<Mutex<Option<FailOn>>>,
}

impl MemoryNodeStore {
    /// Creates a new, empty `MemoryNodeStore` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures this store to simulate failures.
    pub fn set_fail_on(&self, condition: FailOn) {
        *self.fail_on.lock() = Some(condition);
    }

    /// Clears any previously set failure condition.
    pub fn clear_fail_on(&self) {
        *self.fail_on.lock() = None;
    }

    /// Checks if the store contains no nodes.
    pub fn is_empty(&self) -> bool {
        self.state.read().len() == 0
    }

    /// All stored nodes, ascending. Test and debugging helper.
    pub fn snapshot(&self) -> BTreeMap<u64, NodeValue> {
        self.state.read().nodes.clone()
    }

    /// Helper to create a shared trait object.
    pub fn shared(self) -> Arc<dyn NodeStore> {
        Arc::new(self)
    }

    fn check_read(&self) -> Result<(), MTError> {
        if *self.fail_on.lock() == Some(FailOn::Reads) {
            return Err(MTError::storage("Simulated MemoryNodeStore read failure"));
        }
        Ok(())
    }

    fn check_commit(&self, batch: &WriteBatch) -> Result<(), MTError> {
        match *self.fail_on.lock() {
            Some(FailOn::AnyCommit) => Err(MTError::storage(
                "Simulated MemoryNodeStore write failure",
            )),
            Some(FailOn::NodeIndex(i)) if batch.touches(i) => Err(MTError::storage(format!(
                "Simulated MemoryNodeStore write failure for node {}",
                i
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn get_node(&self, node_index: u64) -> Result<Option<NodeValue>, MTError> {
        self.check_read()?;
        Ok(self.state.read().get(node_index))
    }

    async fn get_nodes(&self, node_indices: &[u64]) -> Result<Vec<Node>, MTError> {
        self.check_read()?;
        Ok(self.state.read().get_many(node_indices))
    }

    async fn get_nodes_in_range(&self, min_index: u64, max_index: u64) -> Result<Vec<Node>, MTError> {
        self.check_read()?;
        Ok(self.state.read().range(min_index, max_index))
    }

    async fn get_nodes_by_value(&self, value: &NodeValue) -> Result<Vec<Node>, MTError> {
        self.check_read()?;
        Ok(self.state.read().by_value(value))
    }

    async fn count_nodes(&self) -> Result<u64, MTError> {
        self.check_read()?;
        Ok(self.state.read().len())
    }

    async fn load_leaf_count(&self) -> Result<u64, MTError> {
        self.check_read()?;
        Ok(self.state.read().leaf_count())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), MTError> {
        self.check_commit(&batch)?;
        self.state.write().apply(&batch);
        Ok(())
    }
}
