//! # Quiver Engine
//!
//! Traversal and write coordination over the quiver topology index.
//!
//! - [`traverse()`] / [`traverse_bounded()`] - single-hop and depth-bounded
//!   BFS with per-hop temporal filtering
//! - [`Matcher`] - backtracking subgraph isomorphism over edge-constraint
//!   patterns
//! - [`WriteCoordinator`] - durable-first, serialized mutation discipline
//!   between the columnar store and the index

pub mod coordinator;
pub mod matcher;
pub mod traverse;

// Re-exports
pub use coordinator::{CoordinatorError, DurableStore, WriteCoordinator, WriteOp};
pub use matcher::{Matcher, PatternEdge, PatternError};
pub use traverse::{traverse, traverse_bounded};
