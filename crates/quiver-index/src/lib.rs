//! # Quiver Index
//!
//! In-memory topology index for graph views over columnar storage.
//!
//! The durable columnar store remains the source of truth; this crate holds
//! the transient, read-optimized side of the system:
//!
//! - [`Interner`] - string identifiers to dense u32 handles, append-only
//! - [`Topology`] - mirrored adjacency lists with temporal edge visibility,
//!   tombstones and compaction
//! - [`GraphIndex`] - the facade combining interners and topology
//! - Arrow IPC hydration ([`GraphIndex::load_arrow_stream`])
//! - Binary snapshots for warm-start ([`GraphIndex::save_snapshot`])

pub mod config;
pub mod graph;
pub mod hydrate;
pub mod interner;
pub mod logging;
pub mod snapshot;
pub mod topology;

// Re-exports
pub use config::QuiverConfig;
pub use graph::GraphIndex;
pub use hydrate::HydrateError;
pub use interner::Interner;
pub use snapshot::SnapshotError;
pub use topology::{AllocError, Tombstones, Topology, TopologyStats};
