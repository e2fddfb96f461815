// src/api/mod.rs

/// Async facade bundling store, ingestion, queries and the tracker.
pub mod service;

/// Blocking wrapper for callers without an async runtime.
pub mod sync_api;

pub use service::MerkleTreeService;
pub use sync_api::SyncTree;
