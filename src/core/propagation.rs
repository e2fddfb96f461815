// src/core/propagation.rs

//! Bottom-up recomputation of ancestor hashes.
//!
//! A propagation pass stages every leaf write and every recomputed ancestor
//! in an overlay, then hands the whole set to the store as one
//! [`WriteBatch`]. If any read, hash or the commit fails, nothing of the
//! pass becomes visible.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::debug;

use crate::core::hash::NodeHasher;
use crate::core::index::PathResolver;
use crate::core::node::{NodeValue, TreeMetadata};
use crate::error::{MTError, Result};
use crate::storage::{NodeStore, WriteBatch};

/// Result of a committed propagation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationOutcome {
    /// Root after the commit.
    pub root: NodeValue,
    /// Leaves plus ancestors written by the batch.
    pub nodes_written: usize,
    /// Number of `H(left, right)` evaluations.
    pub hash_calls: usize,
}

/// Recomputes ancestors of changed leaves, one level at a time.
#[derive(Debug, Clone)]
pub struct HashPropagator {
    resolver: PathResolver,
    hasher: Arc<dyn NodeHasher>,
    zero: NodeValue,
    leaf_len: usize,
}

impl HashPropagator {
    /// Fails with `Validation` if the hasher's output length disagrees with
    /// the metadata's node hash length.
    pub fn new(metadata: &TreeMetadata, hasher: Arc<dyn NodeHasher>) -> Result<Self> {
        if hasher.output_len() != metadata.node_hash_length() {
            return Err(MTError::validation(format!(
                "hasher produces {} bytes but the tree expects {}-byte nodes",
                hasher.output_len(),
                metadata.node_hash_length()
            )));
        }
        Ok(Self {
            resolver: PathResolver::new(metadata.height())?,
            hasher,
            zero: metadata.zero().clone(),
            leaf_len: metadata.leaf_hash_length(),
        })
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn hasher(&self) -> &Arc<dyn NodeHasher> {
        &self.hasher
    }

    pub fn zero(&self) -> &NodeValue {
        &self.zero
    }

    /// Committed root, `ZERO` for an empty tree.
    pub async fn root(&self, store: &dyn NodeStore) -> Result<NodeValue> {
        Ok(store.get_node(0).await?.unwrap_or_else(|| self.zero.clone()))
    }

    /// Check a leaf write before anything is staged.
    pub fn check_leaf(&self, leaf_index: u64, value: &NodeValue) -> Result<()> {
        self.resolver.check_leaf(leaf_index)?;
        value.check_len(self.leaf_len, "leaf value")
    }

    fn hash_pair(&self, left: &NodeValue, right: &NodeValue) -> Result<NodeValue> {
        let out = self.hasher.hash(left.as_bytes(), right.as_bytes())?;
        if out.len() != self.zero.len() {
            return Err(MTError::hashing(format!(
                "hasher returned {} bytes, expected {}",
                out.len(),
                self.zero.len()
            )));
        }
        Ok(out)
    }

    /// Value of each child of `parents` that is not already in `staged`, read
    /// in one store call.
    async fn fetch_children(
        &self,
        store: &dyn NodeStore,
        parents: &BTreeSet<u64>,
        staged: &BTreeMap<u64, Option<NodeValue>>,
    ) -> Result<BTreeMap<u64, NodeValue>> {
        let missing: Vec<u64> = parents
            .iter()
            .flat_map(|p| {
                let (l, r) = PathResolver::children(*p);
                [l, r]
            })
            .filter(|c| !staged.contains_key(c))
            .collect();
        if missing.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(store
            .get_nodes(&missing)
            .await?
            .into_iter()
            .map(|n| (n.node_index, n.value))
            .collect())
    }

    /// Hash every parent in `parents` from its children, reading from the
    /// overlay first, then `fetched`, then `ZERO`.
    fn hash_level(
        &self,
        parents: &BTreeSet<u64>,
        staged: &mut BTreeMap<u64, Option<NodeValue>>,
        fetched: &BTreeMap<u64, NodeValue>,
    ) -> Result<usize> {
        let mut calls = 0;
        for parent in parents {
            let (l, r) = PathResolver::children(*parent);
            let value_of = |c: u64| -> NodeValue {
                match staged.get(&c) {
                    Some(Some(v)) => v.clone(),
                    Some(None) => self.zero.clone(),
                    None => fetched.get(&c).cloned().unwrap_or_else(|| self.zero.clone()),
                }
            };
            let (left, right) = (value_of(l), value_of(r));
            let hashed = self.hash_pair(&left, &right)?;
            calls += 1;
            staged.insert(*parent, Some(hashed));
        }
        Ok(calls)
    }

    /// Write `leaves` and every affected ancestor, moving the persisted leaf
    /// count to `leaf_count` in the same batch.
    ///
    /// Each level's distinct parents are hashed once, whatever the number of
    /// leaves beneath them.
    pub async fn propagate(
        &self,
        store: &dyn NodeStore,
        leaves: &BTreeMap<u64, NodeValue>,
        leaf_count: Option<u64>,
    ) -> Result<PropagationOutcome> {
        if leaves.is_empty() {
            if let Some(count) = leaf_count {
                let mut batch = WriteBatch::new();
                batch.set_leaf_count(count);
                store.commit(batch).await?;
            }
            return Ok(PropagationOutcome {
                root: self.root(store).await?,
                nodes_written: 0,
                hash_calls: 0,
            });
        }

        let mut staged: BTreeMap<u64, Option<NodeValue>> = BTreeMap::new();
        let mut frontier = BTreeSet::new();
        for (leaf_index, value) in leaves {
            self.check_leaf(*leaf_index, value)?;
            let node = self.resolver.leaf_to_node(*leaf_index)?;
            staged.insert(node, Some(value.clone()));
            frontier.insert(node);
        }

        let mut hash_calls = 0;
        while !frontier.contains(&0) {
            let parents: BTreeSet<u64> = frontier
                .iter()
                .filter_map(|n| PathResolver::parent(*n))
                .collect();
            let fetched = self.fetch_children(store, &parents, &staged).await?;
            hash_calls += self.hash_level(&parents, &mut staged, &fetched)?;
            frontier = parents;
        }

        let mut batch = WriteBatch::new();
        let mut root = self.zero.clone();
        for (node, value) in staged {
            if let Some(value) = value {
                if node == 0 {
                    root = value.clone();
                }
                batch.put(node, value);
            }
        }
        if let Some(count) = leaf_count {
            batch.set_leaf_count(count);
        }
        let nodes_written = batch.puts().len();
        store.commit(batch).await?;

        debug!(
            "Committed {} leaves ({} nodes, {} hashes), root {}",
            leaves.len(),
            nodes_written,
            hash_calls,
            root
        );
        Ok(PropagationOutcome {
            root,
            nodes_written,
            hash_calls,
        })
    }

    /// Remove leaves `from_leaf..leaf_count` and restore every ancestor to
    /// the value it had when only leaves `0..from_leaf` were applied.
    ///
    /// Ancestors whose whole leaf span starts at or after `from_leaf` are
    /// deleted; the one ancestor per level that straddles the cut is
    /// rehashed. Leaf count moves to `from_leaf` in the same batch.
    pub async fn truncate(
        &self,
        store: &dyn NodeStore,
        from_leaf: u64,
        leaf_count: u64,
    ) -> Result<PropagationOutcome> {
        if from_leaf >= leaf_count {
            return Ok(PropagationOutcome {
                root: self.root(store).await?,
                nodes_written: 0,
                hash_calls: 0,
            });
        }
        let mut lo = self.resolver.leaf_to_node(from_leaf)?;
        let mut hi = self.resolver.leaf_to_node(leaf_count - 1)?;

        let mut staged: BTreeMap<u64, Option<NodeValue>> = (lo..=hi).map(|n| (n, None)).collect();
        let mut hash_calls = 0;
        while lo > 0 {
            lo = (lo - 1) / 2;
            hi = (hi - 1) / 2;
            let (first, _) = self.resolver.leaf_span(lo)?;
            let start = if first < from_leaf {
                let straddling = BTreeSet::from([lo]);
                let fetched = self.fetch_children(store, &straddling, &staged).await?;
                hash_calls += self.hash_level(&straddling, &mut staged, &fetched)?;
                lo + 1
            } else {
                lo
            };
            for node in start..=hi {
                staged.insert(node, None);
            }
        }

        let mut batch = WriteBatch::new();
        let mut root = self.zero.clone();
        for (node, value) in staged {
            match value {
                Some(value) => {
                    if node == 0 {
                        root = value.clone();
                    }
                    batch.put(node, value);
                }
                None => {
                    batch.delete(node);
                }
            }
        }
        batch.set_leaf_count(from_leaf);
        let nodes_written = batch.puts().len() + batch.deletes().len();
        store.commit(batch).await?;

        debug!(
            "Truncated leaves {}..{} ({} nodes touched), root {}",
            from_leaf, leaf_count, nodes_written, root
        );
        Ok(PropagationOutcome {
            root,
            nodes_written,
            hash_calls,
        })
    }
}
