// src/api/service.rs

use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::core::hash::{hasher_for, NodeHasher};
use crate::core::node::{NodeValue, TreeMetadata};
use crate::core::propagation::HashPropagator;
use crate::core::tracker::{Checkpoint, LagReport, RootConsistency, RootTracker};
use crate::error::Result;
use crate::ingest::{spawn_ingestion, IngestReport, IngestStats, IngestionHandle, LeafEvent, LeafIngestor};
use crate::query::QueryEngine;
use crate::storage::{create_node_store, NodeStore};

/// One maintained tree: its store, the single ingestion writer, the query
/// engine and the root tracker.
///
/// Cheap to share behind an `Arc`. Writes are serialized through an async
/// mutex around the [`LeafIngestor`]; queries never take it.
#[derive(Debug)]
pub struct MerkleTreeService {
    config: Config,
    metadata: TreeMetadata,
    store: Arc<dyn NodeStore>,
    ingestor: Arc<Mutex<LeafIngestor>>,
    tracker: Arc<RootTracker>,
    query: QueryEngine,
}

impl MerkleTreeService {
    /// Validate `config`, open the configured store and recover the persisted
    /// watermark and root.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let metadata = config.tree_metadata();
        let store = create_node_store(&config, &metadata).await?;
        Self::with_parts(config, store, hasher_for(metadata.hash_type())).await
    }

    /// Build a service over an existing store and hasher. `ZERO` takes the
    /// hasher's output length.
    pub async fn with_parts(
        config: Config,
        store: Arc<dyn NodeStore>,
        hasher: Arc<dyn NodeHasher>,
    ) -> Result<Self> {
        config.validate()?;
        let metadata = TreeMetadata::new(
            config.tree.height,
            config.tree.hash_type,
            config.tree.leaf_hash_length,
            hasher.output_len(),
        );
        let propagator = HashPropagator::new(&metadata, hasher.clone())?;
        let ingestor = LeafIngestor::open(
            store.clone(),
            propagator,
            config.ingestion.clone(),
            &config.tracker,
        )
        .await?;
        let tracker = ingestor.tracker().clone();
        let query = QueryEngine::new(store.clone(), metadata.clone(), hasher)?;

        info!(
            "Merkle tree service ready: height {}, hash {}, watermark {:?}",
            metadata.height(),
            metadata.hash_type(),
            tracker.watermark()
        );
        Ok(Self {
            config,
            metadata,
            store,
            ingestor: Arc::new(Mutex::new(ingestor)),
            tracker,
            query,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metadata(&self) -> &TreeMetadata {
        &self.metadata
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    /// Read side.
    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    pub fn tracker(&self) -> &Arc<RootTracker> {
        &self.tracker
    }

    /// Current `(watermark, root)`.
    pub fn checkpoint(&self) -> Checkpoint {
        self.tracker.current()
    }

    pub async fn insert_leaf(&self, leaf_index: u64, value: NodeValue) -> Result<IngestReport> {
        self.ingest(LeafEvent::single(leaf_index, value)).await
    }

    pub async fn insert_leaves(&self, min_leaf_index: u64, values: Vec<NodeValue>) -> Result<IngestReport> {
        self.ingest(LeafEvent::batch(min_leaf_index, values)).await
    }

    /// Apply one feed notification directly, bypassing the channel task.
    pub async fn ingest(&self, event: LeafEvent) -> Result<IngestReport> {
        self.ingestor.lock().await.ingest(event).await
    }

    /// Commit buffered entries that have become contiguous.
    pub async fn flush(&self) -> Result<usize> {
        self.ingestor.lock().await.flush().await
    }

    /// Drop leaves `from_leaf..` and their ancestors; see [`LeafIngestor::rewind`].
    pub async fn rewind(&self, from_leaf: u64) -> Result<Checkpoint> {
        self.ingestor.lock().await.rewind(from_leaf).await
    }

    /// Start the channel-driven ingestion task for this tree.
    pub fn spawn_ingestion(&self) -> (IngestionHandle, JoinHandle<Result<IngestStats>>) {
        spawn_ingestion(self.ingestor.clone(), self.config.ingestion.channel_capacity)
    }

    /// Compare against the leaf count observed on the source.
    pub fn check_lag(&self, observed_leaf_count: u64) -> LagReport {
        self.tracker.check_lag(observed_leaf_count)
    }

    /// Compare against a root observed on the source at `watermark`.
    pub fn verify_root(&self, watermark: Option<u64>, observed: &NodeValue) -> RootConsistency {
        self.tracker.verify_root(watermark, observed)
    }
}
