// src/core/tracker.rs

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::TrackerConfig;
use crate::core::node::NodeValue;

/// A `(watermark, root)` pair as of one committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Highest contiguous applied leaf index; `None` before the first leaf.
    pub watermark: Option<u64>,
    /// Root committed with that watermark.
    pub root: NodeValue,
    /// When the checkpoint was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Number of applied leaves, `watermark + 1`.
    pub fn leaf_count(&self) -> u64 {
        self.watermark.map_or(0, |w| w + 1)
    }
}

/// How far the local tree trails an externally observed leaf count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LagReport {
    pub local_leaf_count: u64,
    pub observed_leaf_count: u64,
    /// Leaves observed upstream but not applied locally (0 when ahead).
    pub lag: u64,
    pub within_tolerance: bool,
}

/// Outcome of comparing an externally observed root with local history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootConsistency {
    /// The local root at that watermark equals the observed one.
    Matches,
    /// Local root at that watermark differs.
    Diverged { local: NodeValue },
    /// The watermark is not current and has aged out of history (or was never reached).
    Unknown,
}

#[derive(Debug)]
struct TrackerState {
    current: Checkpoint,
    history: VecDeque<Checkpoint>,
}

/// Holds the current `(watermark, root)` record and a bounded history of
/// earlier ones.
///
/// Only the ingestion path calls [`record`](Self::record), after a batch has
/// committed. Readers get a consistent pair under a read lock.
#[derive(Debug)]
pub struct RootTracker {
    history_len: usize,
    lag_tolerance: u64,
    state: RwLock<TrackerState>,
}

impl RootTracker {
    /// Tracker seeded with the state loaded from the store.
    pub fn new(config: &TrackerConfig, watermark: Option<u64>, root: NodeValue) -> Self {
        let current = Checkpoint {
            watermark,
            root,
            recorded_at: Utc::now(),
        };
        Self {
            history_len: config.history_len.max(1),
            lag_tolerance: config.lag_tolerance,
            state: RwLock::new(TrackerState {
                current,
                history: VecDeque::new(),
            }),
        }
    }

    /// Replace the current record; the previous one moves into history.
    pub fn record(&self, watermark: Option<u64>, root: NodeValue) -> Checkpoint {
        let checkpoint = Checkpoint {
            watermark,
            root,
            recorded_at: Utc::now(),
        };
        let mut state = self.state.write();
        let previous = std::mem::replace(&mut state.current, checkpoint.clone());
        state.history.push_back(previous);
        while state.history.len() > self.history_len {
            state.history.pop_front();
        }
        debug!("Checkpoint watermark={:?} root={}", checkpoint.watermark, checkpoint.root);
        checkpoint
    }

    /// Current `(watermark, root)`.
    pub fn current(&self) -> Checkpoint {
        self.state.read().current.clone()
    }

    pub fn watermark(&self) -> Option<u64> {
        self.state.read().current.watermark
    }

    /// Earlier checkpoints, oldest first, then the current one.
    pub fn history(&self) -> Vec<Checkpoint> {
        let state = self.state.read();
        state
            .history
            .iter()
            .cloned()
            .chain(std::iter::once(state.current.clone()))
            .collect()
    }

    /// Compare the local leaf count against one observed on the source.
    pub fn check_lag(&self, observed_leaf_count: u64) -> LagReport {
        let local_leaf_count = self.state.read().current.leaf_count();
        let lag = observed_leaf_count.saturating_sub(local_leaf_count);
        let within_tolerance = lag <= self.lag_tolerance;
        if !within_tolerance {
            warn!(
                "Local tree is {} leaves behind the source ({} applied, {} observed, tolerance {})",
                lag, local_leaf_count, observed_leaf_count, self.lag_tolerance
            );
        }
        LagReport {
            local_leaf_count,
            observed_leaf_count,
            lag,
            within_tolerance,
        }
    }

    /// Compare a root observed on the source at `watermark` with the local
    /// root recorded for the same watermark.
    pub fn verify_root(&self, watermark: Option<u64>, observed: &NodeValue) -> RootConsistency {
        let state = self.state.read();
        let local = std::iter::once(&state.current)
            .chain(state.history.iter().rev())
            .find(|c| c.watermark == watermark);
        match local {
            Some(c) if &c.root == observed => RootConsistency::Matches,
            Some(c) => {
                warn!(
                    "Root divergence at watermark {:?}: local {} observed {}",
                    watermark, c.root, observed
                );
                RootConsistency::Diverged {
                    local: c.root.clone(),
                }
            }
            None => RootConsistency::Unknown,
        }
    }
}
