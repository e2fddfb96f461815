//! # Query Module
//!
//! Read-only access to a maintained tree: single nodes and leaves, reverse
//! lookup by value, range scans, counts, the root, and sibling paths
//! (Merkle proofs) with their verification.

/// Query engine over the committed state of a node store.
pub mod engine;
pub mod types;

pub use engine::QueryEngine;
pub use types::{verify_sibling_path, Leaf, MerkleProof};
