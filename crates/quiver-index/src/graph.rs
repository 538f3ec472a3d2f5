//! Graph index facade combining interners and topology.
//!
//! [`GraphIndex`] is the owned object the write coordinator holds, one per
//! durable store. It couples the node interner, the edge-type dictionary and
//! the topology, and offers both a handle-space surface (what the traversal
//! engine consumes) and a string-space surface (what the coordinator and the
//! durable store speak).

use crate::interner::Interner;
use crate::topology::{AllocError, Topology, TopologyStats};
use quiver_core::{Direction, EtypeId, Handle, UnknownHandle};

/// In-memory graph index: node interner, edge-type dictionary, topology.
///
/// The index is a transient view over the durable store; it is rebuilt by
/// Arrow hydration or warm-started from a snapshot, never repaired in place.
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    pub(crate) nodes: Interner,
    pub(crate) etypes: Interner,
    pub(crate) topology: Topology,
}

impl GraphIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Interning
    // =========================================================================

    /// Interns a node identifier and makes its handle addressable in the
    /// topology. Returns the existing handle for known identifiers.
    pub fn intern_node(&mut self, id: &str) -> Result<Handle, AllocError> {
        let h = Handle::new(self.nodes.intern(id));
        self.topology.ensure_capacity(h)?;
        Ok(h)
    }

    /// Forward node lookup without interning.
    pub fn lookup_node(&self, id: &str) -> Option<Handle> {
        self.nodes.lookup(id).map(Handle::new)
    }

    /// Resolves a handle back to its node identifier.
    pub fn resolve_node(&self, h: Handle) -> Result<&str, UnknownHandle> {
        self.nodes.resolve(h.as_u32())
    }

    /// Interns an edge-type label.
    pub fn intern_etype(&mut self, label: &str) -> EtypeId {
        EtypeId::new(self.etypes.intern(label))
    }

    /// Forward edge-type lookup without interning.
    pub fn lookup_etype(&self, label: &str) -> Option<EtypeId> {
        self.etypes.lookup(label).map(EtypeId::new)
    }

    /// Resolves an edge-type id back to its label.
    pub fn resolve_etype(&self, t: EtypeId) -> Result<&str, UnknownHandle> {
        self.etypes.resolve(t.as_u32())
    }

    /// Resolves seed identifiers to handles, silently dropping unknown ones.
    /// Orphan filtering is the query planner's responsibility.
    pub fn resolve_seeds<S: AsRef<str>>(&self, ids: &[S]) -> Vec<Handle> {
        ids.iter()
            .filter_map(|id| self.lookup_node(id.as_ref()))
            .collect()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Appends an edge record between known handles.
    pub fn insert_edge(
        &mut self,
        src: Handle,
        dst: Handle,
        etype: EtypeId,
        valid_from_us: i64,
        valid_to_us: i64,
    ) -> Result<(), AllocError> {
        self.topology
            .insert_edge(src, dst, etype, valid_from_us, valid_to_us)
    }

    /// String-space edge append. Unknown endpoints and labels are interned
    /// eagerly; whether a handle corresponds to a persisted node is not the
    /// index's concern.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        etype: &str,
        valid_from_us: i64,
        valid_to_us: i64,
    ) -> Result<(), AllocError> {
        let src = self.intern_node(source)?;
        let dst = self.intern_node(target)?;
        let t = self.intern_etype(etype);
        self.insert_edge(src, dst, t, valid_from_us, valid_to_us)
    }

    /// Closes the oldest active `(src, dst, etype)` record at `valid_to_us`.
    pub fn close_edge(
        &mut self,
        src: Handle,
        dst: Handle,
        etype: EtypeId,
        valid_to_us: i64,
    ) -> bool {
        self.topology.close_edge(src, dst, etype, valid_to_us)
    }

    /// String-space logical edge deletion: closes the active record at
    /// `valid_to_us`. Returns false when endpoint, label or record is absent.
    pub fn remove_edge(
        &mut self,
        source: &str,
        target: &str,
        etype: &str,
        valid_to_us: i64,
    ) -> bool {
        let (Some(src), Some(dst), Some(t)) = (
            self.lookup_node(source),
            self.lookup_node(target),
            self.lookup_etype(etype),
        ) else {
            return false;
        };
        self.close_edge(src, dst, t, valid_to_us)
    }

    /// Marks a node as logically deleted at present time.
    pub fn tombstone_node(&mut self, h: Handle) -> Result<(), AllocError> {
        self.topology.tombstone_node(h)
    }

    /// Clears a node's deletion bit.
    pub fn revive_node(&mut self, h: Handle) -> Result<(), AllocError> {
        self.topology.revive_node(h)
    }

    /// Reads a node's deletion bit.
    pub fn is_tombstoned(&self, h: Handle) -> bool {
        self.topology.is_tombstoned(h)
    }

    /// String-space soft delete. The node keeps its handle and its edge
    /// history; only present-time queries stop seeing it. Returns false for
    /// unknown identifiers.
    pub fn remove_node(&mut self, id: &str) -> Result<bool, AllocError> {
        match self.lookup_node(id) {
            Some(h) => {
                self.tombstone_node(h)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sorts, deduplicates and re-mirrors the adjacency lists.
    pub fn compact(&mut self) {
        let before = self.topology.edge_count();
        self.topology.compact();
        let after = self.topology.edge_count();
        tracing::debug!(before, after, "compacted topology");
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Endpoints of `etype` edges out of `src` visible at `at_us`.
    pub fn active_out(&self, src: Handle, etype: EtypeId, at_us: i64) -> Vec<Handle> {
        self.topology.active_out(src, etype, at_us)
    }

    /// Sources of `etype` edges into `dst` visible at `at_us`.
    pub fn active_in(&self, dst: Handle, etype: EtypeId, at_us: i64) -> Vec<Handle> {
        self.topology.active_in(dst, etype, at_us)
    }

    /// Direction-dispatching neighbor enumeration.
    pub fn active_neighbors(
        &self,
        h: Handle,
        etype: EtypeId,
        dir: Direction,
        at_us: i64,
    ) -> Vec<Handle> {
        self.topology.active_neighbors(h, etype, dir, at_us)
    }

    /// True iff an `etype` edge from `src` to `dst` is visible at `at_us`.
    pub fn has_active_edge(
        &self,
        src: Handle,
        dst: Handle,
        etype: EtypeId,
        at_us: i64,
    ) -> bool {
        self.topology.has_active_edge(src, dst, etype, at_us)
    }

    /// Number of interned nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edge records, including closed history.
    pub fn edge_count(&self) -> usize {
        self.topology.edge_count()
    }

    /// Returns true if nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Topology accessor.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Summary statistics over the topology.
    pub fn stats(&self) -> TopologyStats {
        self.topology.stats()
    }
}

// =============================================================================
// Tests
// =============================================================================
