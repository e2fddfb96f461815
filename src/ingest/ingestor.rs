// src/ingest/ingestor.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::{IngestionConfig, TrackerConfig};
use crate::core::node::NodeValue;
use crate::core::propagation::{HashPropagator, PropagationOutcome};
use crate::core::tracker::{Checkpoint, RootTracker};
use crate::error::{MTError, Result};
use crate::ingest::event::LeafEvent;
use crate::storage::NodeStore;

const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// What a single notification did to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Leaves committed by this call, including drained buffered ones.
    pub applied: usize,
    /// Re-deliveries of already applied or already buffered leaves.
    pub duplicates: usize,
    /// Entries left waiting in the pending buffer afterwards.
    pub buffered: usize,
    /// Watermark after the call.
    pub watermark: Option<u64>,
    /// Root after the call.
    pub root: NodeValue,
}

/// The single writer of a tree.
///
/// Leaves at the watermark are applied at once; leaves ahead of it wait in
/// a bounded pending buffer until the gap closes; leaves behind it are
/// checked against what is stored. Contiguous runs are committed through the
/// [`HashPropagator`] in chunks of at most `batch_size`, and the watermark
/// only moves once a chunk has committed.
#[derive(Debug)]
pub struct LeafIngestor {
    store: Arc<dyn NodeStore>,
    propagator: HashPropagator,
    tracker: Arc<RootTracker>,
    config: IngestionConfig,
    pending: BTreeMap<u64, NodeValue>,
    leaf_count: u64,
}

fn conflict(leaf_index: u64, existing: &NodeValue, received: &NodeValue) -> MTError {
    warn!(
        "Leaf {} re-delivered with value {} but {} is already held",
        leaf_index, received, existing
    );
    MTError::Conflict {
        leaf_index,
        existing: existing.to_hex(),
        received: received.to_hex(),
    }
}

impl LeafIngestor {
    /// Restore the watermark and root persisted in `store` and seed a fresh tracker.
    pub async fn open(
        store: Arc<dyn NodeStore>,
        propagator: HashPropagator,
        ingestion: IngestionConfig,
        tracker_config: &TrackerConfig,
    ) -> Result<Self> {
        let leaf_count = store.load_leaf_count().await?;
        if leaf_count > 0 {
            let last = propagator.resolver().leaf_to_node(leaf_count - 1)?;
            if store.get_node(last).await?.is_none() {
                return Err(MTError::storage(format!(
                    "persisted leaf count is {} but leaf {} is missing",
                    leaf_count,
                    leaf_count - 1
                )));
            }
        }
        let root = propagator.root(store.as_ref()).await?;
        let watermark = leaf_count.checked_sub(1);
        info!("Recovered tree state: watermark {:?}, root {}", watermark, root);

        Ok(Self {
            tracker: Arc::new(RootTracker::new(tracker_config, watermark, root)),
            store,
            propagator,
            config: ingestion,
            pending: BTreeMap::new(),
            leaf_count,
        })
    }

    pub fn tracker(&self) -> &Arc<RootTracker> {
        &self.tracker
    }

    pub fn propagator(&self) -> &HashPropagator {
        &self.propagator
    }

    /// Highest contiguous applied leaf index.
    pub fn watermark(&self) -> Option<u64> {
        self.leaf_count.checked_sub(1)
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    /// Number of out-of-order entries waiting for their predecessors.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Apply one notification.
    ///
    /// Every entry is validated and classified before anything changes, so
    /// `OutOfRange`, `Validation`, `Conflict` and `SyncGap` leave the tree
    /// and the buffer exactly as they were. A store or hash failure aborts
    /// the chunk in flight after `max_retries` attempts; chunks committed
    /// before it stay committed and the rest stay buffered.
    pub async fn ingest(&mut self, event: LeafEvent) -> Result<IngestReport> {
        let pairs = event.into_pairs()?;
        for (leaf_index, value) in &pairs {
            self.propagator.check_leaf(*leaf_index, value)?;
        }

        let (fresh, duplicates) = self.classify(pairs).await?;
        self.check_capacity(&fresh)?;

        let newly_buffered = fresh.len();
        self.pending.extend(fresh);
        let applied = self.drain().await?;
        if applied < newly_buffered && !self.pending.is_empty() {
            debug!(
                "Buffered out-of-order leaves, waiting for leaf {} ({} pending)",
                self.leaf_count,
                self.pending.len()
            );
        }

        Ok(IngestReport {
            applied,
            duplicates,
            buffered: self.pending.len(),
            watermark: self.watermark(),
            root: self.tracker.current().root,
        })
    }

    /// Commit whatever contiguous run the pending buffer holds. Used after a
    /// failed `ingest` once the store is healthy again.
    pub async fn flush(&mut self) -> Result<usize> {
        self.drain().await
    }

    /// Split `pairs` into entries not seen before and a duplicate count,
    /// failing on any value that disagrees with an applied, buffered or
    /// earlier entry of the same notification.
    async fn classify(&self, pairs: Vec<(u64, NodeValue)>) -> Result<(BTreeMap<u64, NodeValue>, usize)> {
        let resolver = self.propagator.resolver();
        let applied_nodes = pairs
            .iter()
            .filter(|(i, _)| *i < self.leaf_count)
            .map(|(i, _)| resolver.leaf_to_node(*i))
            .collect::<Result<Vec<u64>>>()?;
        let stored: BTreeMap<u64, NodeValue> = if applied_nodes.is_empty() {
            BTreeMap::new()
        } else {
            self.store
                .get_nodes(&applied_nodes)
                .await?
                .into_iter()
                .map(|n| (n.node_index, n.value))
                .collect()
        };

        let mut fresh = BTreeMap::new();
        let mut duplicates = 0;
        for (leaf_index, value) in pairs {
            if leaf_index < self.leaf_count {
                let node = resolver.leaf_to_node(leaf_index)?;
                match stored.get(&node) {
                    Some(existing) if *existing == value => duplicates += 1,
                    Some(existing) => return Err(conflict(leaf_index, existing, &value)),
                    None => {
                        return Err(MTError::storage(format!(
                            "applied leaf {} is missing from the store",
                            leaf_index
                        )))
                    }
                }
            } else if let Some(existing) = self.pending.get(&leaf_index).or_else(|| fresh.get(&leaf_index)) {
                if *existing == value {
                    duplicates += 1;
                } else {
                    return Err(conflict(leaf_index, existing, &value));
                }
            } else {
                fresh.insert(leaf_index, value);
            }
        }
        Ok((fresh, duplicates))
    }

    /// Fail with `SyncGap` if accepting `fresh` would leave more entries
    /// buffered than `buffer_size` after draining.
    fn check_capacity(&self, fresh: &BTreeMap<u64, NodeValue>) -> Result<()> {
        let mut next = self.leaf_count;
        while self.pending.contains_key(&next) || fresh.contains_key(&next) {
            next += 1;
        }
        let drainable = (next - self.leaf_count) as usize;
        let total = self.pending.len() + fresh.len();
        let remaining = total - drainable;
        if remaining > self.config.buffer_size {
            error!(
                "Pending buffer exhausted waiting for leaf {}: {} entries, capacity {}",
                next,
                remaining,
                self.config.buffer_size
            );
            return Err(MTError::SyncGap {
                missing_leaf: next,
                pending: remaining,
                capacity: self.config.buffer_size,
            });
        }
        Ok(())
    }

    /// Commit the contiguous prefix of the buffer in `batch_size` chunks.
    async fn drain(&mut self) -> Result<usize> {
        let mut applied = 0;
        loop {
            let mut chunk = BTreeMap::new();
            let mut next = self.leaf_count;
            while chunk.len() < self.config.batch_size {
                match self.pending.get(&next) {
                    Some(value) => {
                        chunk.insert(next, value.clone());
                        next += 1;
                    }
                    None => break,
                }
            }
            if chunk.is_empty() {
                return Ok(applied);
            }

            let outcome = self.commit_with_retry(&chunk, next).await?;
            for leaf_index in chunk.keys() {
                self.pending.remove(leaf_index);
            }
            applied += chunk.len();
            self.leaf_count = next;
            self.tracker.record(self.watermark(), outcome.root);
        }
    }

    async fn commit_with_retry(
        &self,
        chunk: &BTreeMap<u64, NodeValue>,
        leaf_count: u64,
    ) -> Result<PropagationOutcome> {
        let mut attempt = 0u32;
        loop {
            match self
                .propagator
                .propagate(self.store.as_ref(), chunk, Some(leaf_count))
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Batch of {} leaves failed ({}), retry {}/{}",
                        chunk.len(),
                        e,
                        attempt,
                        self.config.max_retries
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Roll the tree back so that only leaves `0..from_leaf` remain.
    ///
    /// Operator-driven reorg recovery: after a `Conflict`, rewind to the
    /// divergence point and replay the corrected suffix. Buffered entries
    /// are discarded.
    pub async fn rewind(&mut self, from_leaf: u64) -> Result<Checkpoint> {
        if from_leaf > self.leaf_count {
            return Err(MTError::invalid_input(format!(
                "cannot rewind to leaf {}: only {} leaves are applied",
                from_leaf, self.leaf_count
            )));
        }
        let outcome = self
            .propagator
            .truncate(self.store.as_ref(), from_leaf, self.leaf_count)
            .await?;
        let dropped = self.pending.len();
        self.pending.clear();
        warn!(
            "Rewound tree from {} to {} leaves ({} buffered entries dropped), root {}",
            self.leaf_count, from_leaf, dropped, outcome.root
        );
        self.leaf_count = from_leaf;
        Ok(self.tracker.record(self.watermark(), outcome.root))
    }
}
