//! Write coordination between the durable store and the in-memory index.
//!
//! The index is a transient view; the durable columnar store is the source of
//! truth. [`WriteCoordinator`] enforces the discipline that keeps the two
//! consistent:
//!
//! - **Serialized writes.** A single mutex serializes every mutation; at most
//!   one mutation is in flight at a time.
//! - **Durable-first ordering.** Each write is committed to the
//!   [`DurableStore`] before the index is touched. On durable failure the
//!   index is untouched; on index failure after durable success the
//!   coordinator latches a *diverged* flag and refuses further operations
//!   until [`rehydrate`](WriteCoordinator::rehydrate) rebuilds the index from
//!   the source of truth.
//! - **Read isolation.** Readers take the read half of an `RwLock`, so no
//!   reader ever observes partial adjacency growth.

use quiver_index::{AllocError, GraphIndex, HydrateError, SnapshotError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use thiserror::Error;

/// A mutation in string space, as the durable store speaks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Append an edge with a validity interval ([`quiver_core::STILL_ACTIVE`]
    /// for open).
    InsertEdge {
        source: String,
        target: String,
        etype: String,
        valid_from_us: i64,
        valid_to_us: i64,
    },
    /// Close the active record of the triple at `valid_to_us`.
    CloseEdge {
        source: String,
        target: String,
        etype: String,
        valid_to_us: i64,
    },
    /// Mark a node logically deleted at present time.
    TombstoneNode { id: String },
    /// Clear a node's deletion mark.
    ReviveNode { id: String },
}

/// The durable side of a write. Implementations commit the operation to the
/// source of truth and only return `Ok` once it is persistent.
pub trait DurableStore {
    /// Error surfaced when the store rejects or fails a commit.
    type Error: std::error::Error;

    /// Commits one operation durably.
    fn commit(&mut self, op: &WriteOp) -> Result<(), Self::Error>;
}

/// Errors surfaced by the coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError<E: std::error::Error> {
    /// The durable store rejected the write; the index is untouched.
    #[error("durable store rejected the write: {0}")]
    Durable(E),

    /// The index failed after the durable commit succeeded; the coordinator
    /// is now diverged and must be re-hydrated.
    #[error("index update failed after durable commit: {0}")]
    Index(#[from] AllocError),

    /// Re-hydration from the source of truth failed.
    #[error("re-hydration failed: {0}")]
    Hydration(#[from] HydrateError),

    /// Warm-start from a snapshot failed.
    #[error("warm start failed: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The index is diverged from the durable store; re-hydrate before
    /// issuing further operations.
    #[error("index diverged from the durable store; re-hydration required")]
    Diverged,
}

/// Owns one [`GraphIndex`] per durable store and funnels every mutation
/// through the durable-first, serialized-write discipline.
#[derive(Debug)]
pub struct WriteCoordinator<S> {
    index: RwLock<GraphIndex>,
    store: Mutex<S>,
    diverged: AtomicBool,
}

impl<S: DurableStore> WriteCoordinator<S> {
    /// Creates a coordinator over an empty index.
    pub fn new(store: S) -> Self {
        Self::with_index(store, GraphIndex::new())
    }

    /// Creates a coordinator over a pre-built index (hydrated or
    /// warm-started elsewhere).
    pub fn with_index(store: S, index: GraphIndex) -> Self {
        Self {
            index: RwLock::new(index),
            store: Mutex::new(store),
            diverged: AtomicBool::new(false),
        }
    }

    /// True once an index failure after a durable commit has been observed.
    pub fn is_diverged(&self) -> bool {
        self.diverged.load(Ordering::Acquire)
    }

    /// Applies one mutation: durable store first, index second.
    pub fn apply(&self, op: WriteOp) -> Result<(), CoordinatorError<S::Error>> {
        if self.is_diverged() {
            return Err(CoordinatorError::Diverged);
        }
        // Held for the whole call: commit and index update form one
        // serialized mutation.
        let mut store = self.store.lock().map_err(|_| self.latch_diverged())?;
        store.commit(&op).map_err(CoordinatorError::Durable)?;

        let mut index = self.index.write().map_err(|_| self.latch_diverged())?;
        if let Err(e) = apply_to_index(&mut index, &op) {
            drop(index);
            self.mark_diverged();
            return Err(CoordinatorError::Index(e));
        }
        Ok(())
    }

    /// Runs a read closure under the read lock. Fails once the index is
    /// diverged; stale answers are worse than no answers.
    pub fn read<R>(
        &self,
        f: impl FnOnce(&GraphIndex) -> R,
    ) -> Result<R, CoordinatorError<S::Error>> {
        if self.is_diverged() {
            return Err(CoordinatorError::Diverged);
        }
        let index = self.index.read().map_err(|_| self.latch_diverged())?;
        Ok(f(&index))
    }

    /// Rebuilds the index from an Arrow IPC stream produced by the source of
    /// truth, then clears the diverged flag. Returns the edge count loaded.
    pub fn rehydrate(&self, bytes: &[u8]) -> Result<usize, CoordinatorError<S::Error>> {
        let _store = self.store.lock().map_err(|_| self.latch_diverged())?;
        let mut fresh = GraphIndex::new();
        let edges = fresh.load_arrow_stream(bytes)?;
        fresh.compact();

        let mut index = self.index.write().map_err(|_| self.latch_diverged())?;
        *index = fresh;
        drop(index);
        self.diverged.store(false, Ordering::Release);
        tracing::info!(edges, "coordinator re-hydrated index");
        Ok(edges)
    }

    /// Replaces the index from a snapshot file. The caller is responsible
    /// for the snapshot being no older than the durable store's view.
    pub fn warm_start(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(), CoordinatorError<S::Error>> {
        let _store = self.store.lock().map_err(|_| self.latch_diverged())?;
        let loaded = GraphIndex::load_snapshot(path)?;

        let mut index = self.index.write().map_err(|_| self.latch_diverged())?;
        *index = loaded;
        drop(index);
        self.diverged.store(false, Ordering::Release);
        Ok(())
    }

    fn mark_diverged(&self) {
        self.diverged.store(true, Ordering::Release);
    }

    fn latch_diverged(&self) -> CoordinatorError<S::Error> {
        self.mark_diverged();
        CoordinatorError::Diverged
    }
}

/// Applies a durably-committed operation to the index.
fn apply_to_index(index: &mut GraphIndex, op: &WriteOp) -> Result<(), AllocError> {
    match op {
        WriteOp::InsertEdge {
            source,
            target,
            etype,
            valid_from_us,
            valid_to_us,
        } => index.add_edge(source, target, etype, *valid_from_us, *valid_to_us),
        WriteOp::CloseEdge {
            source,
            target,
            etype,
            valid_to_us,
        } => {
            if !index.remove_edge(source, target, etype, *valid_to_us) {
                tracing::warn!(
                    %source,
                    %target,
                    %etype,
                    "close committed durably but no active record matched in the index"
                );
            }
            Ok(())
        }
        WriteOp::TombstoneNode { id } => {
            // The store knows the node even if no hydrated edge mentioned it;
            // intern eagerly so the bit has somewhere to live.
            let h = index.intern_node(id)?;
            index.tombstone_node(h)
        }
        WriteOp::ReviveNode { id } => {
            let h = index.intern_node(id)?;
            index.revive_node(h)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::{NOW, STILL_ACTIVE};
    use std::fmt;

    /// In-memory durable store: records committed ops, optionally failing.
    #[derive(Debug, Default)]
    struct MemStore {
        log: Vec<WriteOp>,
        fail_next: bool,
    }

    #[derive(Debug)]
    struct MemStoreError;

    impl fmt::Display for MemStoreError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "durable commit refused")
        }
    }

    impl std::error::Error for MemStoreError {}

    impl DurableStore for &mut MemStore {
        type Error = MemStoreError;

        fn commit(&mut self, op: &WriteOp) -> Result<(), MemStoreError> {
            if self.fail_next {
                self.fail_next = false;
                return Err(MemStoreError);
            }
            self.log.push(op.clone());
            Ok(())
        }
    }

    fn insert_op(source: &str, target: &str) -> WriteOp {
        WriteOp::InsertEdge {
            source: source.to_string(),
            target: target.to_string(),
            etype: "LINK".to_string(),
            valid_from_us: 0,
            valid_to_us: STILL_ACTIVE,
        }
    }

    #[test]
    fn test_apply_updates_store_then_index() {
        let mut store = MemStore::default();
        let coordinator = WriteCoordinator::new(&mut store);
        coordinator.apply(insert_op("a", "b")).unwrap();

        let edges = coordinator.read(|index| index.edge_count()).unwrap();
        assert_eq!(edges, 1);
        drop(coordinator);
        assert_eq!(store.log.len(), 1);
    }

    #[test]
    fn test_durable_failure_leaves_index_untouched() {
        let mut store = MemStore {
            fail_next: true,
            ..Default::default()
        };
        let coordinator = WriteCoordinator::new(&mut store);

        let err = coordinator.apply(insert_op("a", "b")).unwrap_err();
        assert!(matches!(err, CoordinatorError::Durable(_)), "{err}");
        assert!(!coordinator.is_diverged());
        assert_eq!(coordinator.read(|index| index.edge_count()).unwrap(), 0);

        // The next write goes through normally.
        coordinator.apply(insert_op("a", "b")).unwrap();
        assert_eq!(coordinator.read(|index| index.edge_count()).unwrap(), 1);
    }

    #[test]
    fn test_close_and_tombstone_ops() {
        let mut store = MemStore::default();
        let coordinator = WriteCoordinator::new(&mut store);
        coordinator.apply(insert_op("a", "b")).unwrap();
        coordinator
            .apply(WriteOp::CloseEdge {
                source: "a".to_string(),
                target: "b".to_string(),
                etype: "LINK".to_string(),
                valid_to_us: 2_000,
            })
            .unwrap();
        coordinator
            .apply(WriteOp::TombstoneNode { id: "c".to_string() })
            .unwrap();

        coordinator
            .read(|index| {
                let a = index.lookup_node("a").unwrap();
                let t = index.lookup_etype("LINK").unwrap();
                assert!(index.active_out(a, t, NOW).is_empty());
                let c = index.lookup_node("c").unwrap();
                assert!(index.is_tombstoned(c));
            })
            .unwrap();

        coordinator
            .apply(WriteOp::ReviveNode { id: "c".to_string() })
            .unwrap();
        coordinator
            .read(|index| {
                let c = index.lookup_node("c").unwrap();
                assert!(!index.is_tombstoned(c));
            })
            .unwrap();
    }

    #[test]
    fn test_close_of_unknown_edge_is_tolerated() {
        let mut store = MemStore::default();
        let coordinator = WriteCoordinator::new(&mut store);
        coordinator
            .apply(WriteOp::CloseEdge {
                source: "ghost".to_string(),
                target: "ghost2".to_string(),
                etype: "LINK".to_string(),
                valid_to_us: 1,
            })
            .unwrap();
        assert!(!coordinator.is_diverged());
    }
}
