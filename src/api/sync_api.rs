// src/api/sync_api.rs

use tokio::runtime::Runtime;

use crate::api::service::MerkleTreeService;
use crate::config::Config;
use crate::core::node::NodeValue;
use crate::core::tracker::Checkpoint;
use crate::error::Result;
use crate::ingest::{IngestReport, LeafEvent};
use crate::query::MerkleProof;

/// Blocking wrapper around [`MerkleTreeService`] for callers without an
/// async runtime.
///
/// Owns a Tokio runtime and blocks the calling thread on every operation.
/// Must not be used from inside another Tokio runtime.
#[derive(Debug)]
pub struct SyncTree {
    service: MerkleTreeService,
    rt: Runtime,
}

impl SyncTree {
    /// Opens the tree described by `config`, blocking until the store is
    /// loaded and the watermark recovered.
    pub fn open(config: Config) -> Result<Self> {
        let rt = Runtime::new()?;
        let service = rt.block_on(MerkleTreeService::open(config))?;
        Ok(Self { service, rt })
    }

    /// The wrapped async service.
    pub fn service(&self) -> &MerkleTreeService {
        &self.service
    }

    pub fn ingest(&self, event: LeafEvent) -> Result<IngestReport> {
        self.rt.block_on(self.service.ingest(event))
    }

    pub fn rewind(&self, from_leaf: u64) -> Result<Checkpoint> {
        self.rt.block_on(self.service.rewind(from_leaf))
    }

    pub fn get_node(&self, node_index: u64) -> Result<NodeValue> {
        self.rt.block_on(self.service.query().get_node(node_index))
    }

    pub fn get_root(&self) -> Result<NodeValue> {
        self.rt.block_on(self.service.query().get_root())
    }

    pub fn get_proof(&self, leaf_index: u64) -> Result<MerkleProof> {
        self.rt.block_on(self.service.query().get_proof(leaf_index))
    }

    /// Current `(watermark, root)`.
    pub fn checkpoint(&self) -> Checkpoint {
        self.service.checkpoint()
    }
}
