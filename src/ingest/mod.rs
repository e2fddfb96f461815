// src/ingest/mod.rs

//! Leaf ingestion and reconciliation.
//!
//! [`LeafIngestor`] is the only writer of a tree. It can be driven directly
//! or through the channel task started by [`spawn_ingestion`].

pub mod actor;
pub mod event;
pub mod ingestor;

pub use actor::{spawn_ingestion, IngestStats, IngestionHandle};
pub use event::LeafEvent;
pub use ingestor::{IngestReport, LeafIngestor};
