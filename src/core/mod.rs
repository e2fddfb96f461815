// src/core/mod.rs

/// Level-order index arithmetic: leaf/node mapping, parents, siblings and paths.
pub mod index;
/// `NodeValue`, `Node` and the immutable `TreeMetadata`.
pub mod node;
/// The pluggable two-to-one `NodeHasher` and the built-in SHA-256 / BLAKE3 hashers.
pub mod hash;
/// Batched, atomic recomputation of ancestor hashes.
pub mod propagation;
/// The `(watermark, root)` record and its audit history.
pub mod tracker;

pub use hash::{hasher_for, Blake3Hasher, NodeHasher, ShaHasher};
pub use index::{PathResolver, MAX_TREE_HEIGHT};
pub use node::{Node, NodeValue, TreeMetadata};
pub use propagation::{HashPropagator, PropagationOutcome};
pub use tracker::{Checkpoint, LagReport, RootConsistency, RootTracker};
