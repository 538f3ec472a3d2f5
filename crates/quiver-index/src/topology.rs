//! Mutable compressed-adjacency topology with temporal edge visibility.
//!
//! The topology keeps two mirrored adjacency structures, `outgoing` and
//! `incoming`, both keyed by dense node handles. Each logical edge is stored
//! as two independent record copies, one per direction, carrying identical
//! validity intervals; the mutation path keeps them in step and [`compact`]
//! re-establishes the invariant after raw bulk loads.
//!
//! Edges are never removed. A logical deletion closes the record's validity
//! interval, and a per-node tombstone bit hides a node from present-time
//! queries while leaving its history reachable.
//!
//! [`compact`]: Topology::compact

use quiver_core::{Direction, EdgeRecord, EtypeId, Handle, NOW};
use serde::{Deserialize, Serialize};
use std::collections::TryReserveError;
use thiserror::Error;

/// Adjacency growth that the allocator refused.
///
/// Growth is transactional: every structure is reserved before any is
/// resized, so a failed grow leaves the topology exactly as it was.
#[derive(Debug, Error)]
#[error("failed to grow topology: {source}")]
pub struct AllocError {
    #[from]
    source: TryReserveError,
}

// =============================================================================
// Tombstones - per-node deletion bits
// =============================================================================

/// Bitset indexed by node handle; a set bit marks the node as logically
/// absent at present time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tombstones {
    words: Vec<u64>,
    bits: usize,
}

impl Tombstones {
    const WORD_BITS: usize = 64;

    /// Number of u64 words needed to cover `bits` positions.
    pub fn words_for(bits: usize) -> usize {
        bits.div_ceil(Self::WORD_BITS)
    }

    /// Reserves backing storage for `bits` positions without growing.
    fn try_reserve_for(&mut self, bits: usize) -> Result<(), TryReserveError> {
        let needed = Self::words_for(bits);
        if needed > self.words.len() {
            self.words.try_reserve(needed - self.words.len())?;
        }
        Ok(())
    }

    /// Grows to cover `bits` positions. Reserve first via `try_reserve_for`.
    fn grow(&mut self, bits: usize) {
        let needed = Self::words_for(bits);
        if needed > self.words.len() {
            self.words.resize(needed, 0);
        }
        self.bits = self.bits.max(bits);
    }

    /// Sets the bit for `index`. The index must be covered.
    fn set(&mut self, index: usize) {
        self.words[index / Self::WORD_BITS] |= 1u64 << (index % Self::WORD_BITS);
    }

    /// Clears the bit for `index`. The index must be covered.
    fn clear(&mut self, index: usize) {
        self.words[index / Self::WORD_BITS] &= !(1u64 << (index % Self::WORD_BITS));
    }

    /// Reads the bit for `index`; uncovered indices read as unset.
    pub fn get(&self, index: usize) -> bool {
        self.words
            .get(index / Self::WORD_BITS)
            .is_some_and(|w| w & (1u64 << (index % Self::WORD_BITS)) != 0)
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Backing words, exactly `words_for(bits)` long once grown to `bits`.
    pub fn as_words(&self) -> &[u64] {
        &self.words
    }

    /// Rebuilds from snapshot words covering `bits` positions.
    pub fn from_words(words: Vec<u64>, bits: usize) -> Self {
        Self { words, bits }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Summary statistics over the topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyStats {
    /// Addressable node slots.
    pub node_count: usize,
    /// Total edge records in the outgoing index, including closed history.
    pub edge_count: usize,
    /// Edge records whose validity interval is still open.
    pub active_edge_count: usize,
    /// Largest outgoing record count over all nodes.
    pub max_out_degree: usize,
    /// Mean outgoing record count.
    pub avg_out_degree: f64,
    /// Nodes currently tombstoned.
    pub tombstoned_nodes: usize,
    /// Estimated heap usage in bytes.
    pub memory_bytes: usize,
}

// =============================================================================
// Topology
// =============================================================================

/// Per-direction adjacency lists, tombstone bits and the mutation surface.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// `outgoing[h]` holds records for edges whose source is `h`.
    outgoing: Vec<Vec<EdgeRecord>>,
    /// `incoming[h]` holds mirror records for edges whose target is `h`,
    /// with `peer` carrying the source handle.
    incoming: Vec<Vec<EdgeRecord>>,
    /// Per-node deletion bits, applied only to present-time queries.
    tombstones: Tombstones,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of addressable node slots.
    pub fn node_count(&self) -> usize {
        self.outgoing.len()
    }

    /// Total edge records in the outgoing index.
    pub fn edge_count(&self) -> usize {
        self.outgoing.iter().map(Vec::len).sum()
    }

    /// Returns true if no node slot exists.
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }

    /// Grows `outgoing`, `incoming` and the tombstone bitset so `h` is
    /// addressable. All three structures are reserved before any is resized;
    /// on failure the topology is unchanged.
    pub fn ensure_capacity(&mut self, h: Handle) -> Result<(), AllocError> {
        let needed = h.as_usize() + 1;
        if needed <= self.outgoing.len() {
            return Ok(());
        }
        let additional = needed - self.outgoing.len();
        self.outgoing.try_reserve(additional)?;
        self.incoming.try_reserve(additional)?;
        self.tombstones.try_reserve_for(needed)?;
        self.outgoing.resize_with(needed, Vec::new);
        self.incoming.resize_with(needed, Vec::new);
        self.tombstones.grow(needed);
        Ok(())
    }

    /// Appends an edge record to both adjacency lists.
    ///
    /// Duplicates are tolerated; [`compact`](Self::compact) suppresses them.
    pub fn insert_edge(
        &mut self,
        src: Handle,
        dst: Handle,
        etype: EtypeId,
        valid_from_us: i64,
        valid_to_us: i64,
    ) -> Result<(), AllocError> {
        self.ensure_capacity(if src >= dst { src } else { dst })?;
        let s = src.as_usize();
        let d = dst.as_usize();
        self.outgoing[s].try_reserve(1)?;
        self.incoming[d].try_reserve(1)?;
        self.outgoing[s].push(EdgeRecord {
            peer: dst,
            etype,
            valid_from_us,
            valid_to_us,
        });
        self.incoming[d].push(EdgeRecord {
            peer: src,
            etype,
            valid_from_us,
            valid_to_us,
        });
        Ok(())
    }

    /// Closes the oldest active record for `(src, dst, etype)` in both lists,
    /// setting its `valid_to_us` to `valid_to_us`.
    ///
    /// Returns false when no active record matches.
    pub fn close_edge(
        &mut self,
        src: Handle,
        dst: Handle,
        etype: EtypeId,
        valid_to_us: i64,
    ) -> bool {
        let s = src.as_usize();
        let Some(out_list) = self.outgoing.get_mut(s) else {
            return false;
        };
        // Oldest active record wins when coordinator discipline slipped and
        // several are open for the same triple.
        let target = out_list
            .iter()
            .enumerate()
            .filter(|(_, r)| r.peer == dst && r.etype == etype && r.is_active())
            .min_by_key(|(_, r)| r.valid_from_us)
            .map(|(i, r)| (i, r.valid_from_us));
        let Some((out_idx, valid_from_us)) = target else {
            return false;
        };
        out_list[out_idx].valid_to_us = valid_to_us;

        if let Some(in_list) = self.incoming.get_mut(dst.as_usize()) {
            if let Some(rec) = in_list.iter_mut().find(|r| {
                r.peer == src
                    && r.etype == etype
                    && r.is_active()
                    && r.valid_from_us == valid_from_us
            }) {
                rec.valid_to_us = valid_to_us;
            }
        }
        true
    }

    /// Marks a node as logically deleted at present time.
    pub fn tombstone_node(&mut self, h: Handle) -> Result<(), AllocError> {
        self.ensure_capacity(h)?;
        self.tombstones.set(h.as_usize());
        Ok(())
    }

    /// Clears a node's deletion bit.
    pub fn revive_node(&mut self, h: Handle) -> Result<(), AllocError> {
        self.ensure_capacity(h)?;
        self.tombstones.clear(h.as_usize());
        Ok(())
    }

    /// Reads a node's deletion bit; unknown handles read as live.
    pub fn is_tombstoned(&self, h: Handle) -> bool {
        self.tombstones.get(h.as_usize())
    }

    /// Endpoints reachable from `src` over `etype` edges visible at `at_us`.
    ///
    /// Set semantics: each endpoint appears once, in adjacency order (stable
    /// after compaction). Tombstoned endpoints are filtered only for
    /// present-time queries (`at_us == NOW`).
    pub fn active_out(&self, src: Handle, etype: EtypeId, at_us: i64) -> Vec<Handle> {
        self.active_endpoints(&self.outgoing, src, etype, at_us)
    }

    /// Sources of `etype` edges arriving at `dst` visible at `at_us`.
    pub fn active_in(&self, dst: Handle, etype: EtypeId, at_us: i64) -> Vec<Handle> {
        self.active_endpoints(&self.incoming, dst, etype, at_us)
    }

    /// Direction-dispatching variant of [`active_out`](Self::active_out) /
    /// [`active_in`](Self::active_in).
    pub fn active_neighbors(
        &self,
        h: Handle,
        etype: EtypeId,
        dir: Direction,
        at_us: i64,
    ) -> Vec<Handle> {
        match dir {
            Direction::Outgoing => self.active_out(h, etype, at_us),
            Direction::Incoming => self.active_in(h, etype, at_us),
        }
    }

    fn active_endpoints(
        &self,
        lists: &[Vec<EdgeRecord>],
        h: Handle,
        etype: EtypeId,
        at_us: i64,
    ) -> Vec<Handle> {
        let Some(list) = lists.get(h.as_usize()) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for rec in list {
            if rec.etype != etype || !rec.is_visible_at(at_us) {
                continue;
            }
            if at_us == NOW && self.is_tombstoned(rec.peer) {
                continue;
            }
            if !out.contains(&rec.peer) {
                out.push(rec.peer);
            }
        }
        out
    }

    /// True iff an `etype` edge from `src` to `dst` is visible at `at_us`.
    ///
    /// Present-time checks also require both endpoints to be live.
    pub fn has_active_edge(
        &self,
        src: Handle,
        dst: Handle,
        etype: EtypeId,
        at_us: i64,
    ) -> bool {
        if at_us == NOW && (self.is_tombstoned(src) || self.is_tombstoned(dst)) {
            return false;
        }
        self.outgoing
            .get(src.as_usize())
            .is_some_and(|list| {
                list.iter()
                    .any(|r| r.peer == dst && r.etype == etype && r.is_visible_at(at_us))
            })
    }

    /// Sorts and deduplicates every adjacency list, then rebuilds the
    /// incoming index from outgoing to repair any asymmetry left by raw bulk
    /// loads. Idempotent; handles are never renumbered.
    pub fn compact(&mut self) {
        for list in &mut self.outgoing {
            list.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            list.dedup();
            list.shrink_to_fit();
        }

        for list in &mut self.incoming {
            list.clear();
        }
        for src in 0..self.outgoing.len() {
            for i in 0..self.outgoing[src].len() {
                let rec = self.outgoing[src][i];
                self.incoming[rec.peer.as_usize()].push(EdgeRecord {
                    peer: Handle::from(src),
                    ..rec
                });
            }
        }
        for list in &mut self.incoming {
            list.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            list.shrink_to_fit();
        }
    }

    /// Raw outgoing list for a node; empty for unknown handles.
    pub fn outgoing_records(&self, h: Handle) -> &[EdgeRecord] {
        self.outgoing.get(h.as_usize()).map_or(&[], Vec::as_slice)
    }

    /// Raw incoming list for a node; empty for unknown handles.
    pub fn incoming_records(&self, h: Handle) -> &[EdgeRecord] {
        self.incoming.get(h.as_usize()).map_or(&[], Vec::as_slice)
    }

    /// Tombstone bitset accessor for the snapshot codec.
    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    /// Rebuilds a topology from decoded snapshot parts. The caller is
    /// responsible for having validated handles against the node count.
    pub(crate) fn from_parts(
        outgoing: Vec<Vec<EdgeRecord>>,
        incoming: Vec<Vec<EdgeRecord>>,
        tombstones: Tombstones,
    ) -> Self {
        Self {
            outgoing,
            incoming,
            tombstones,
        }
    }

    /// Returns summary statistics.
    pub fn stats(&self) -> TopologyStats {
        let node_count = self.outgoing.len();
        let mut edge_count = 0;
        let mut active_edge_count = 0;
        let mut max_out_degree = 0;
        for list in &self.outgoing {
            edge_count += list.len();
            active_edge_count += list.iter().filter(|r| r.is_active()).count();
            max_out_degree = max_out_degree.max(list.len());
        }
        let avg_out_degree = if node_count > 0 {
            edge_count as f64 / node_count as f64
        } else {
            0.0
        };

        let record = std::mem::size_of::<EdgeRecord>();
        let list_header = std::mem::size_of::<Vec<EdgeRecord>>();
        let memory_bytes = std::mem::size_of::<Self>()
            + (self.outgoing.len() + self.incoming.len()) * list_header
            + self
                .outgoing
                .iter()
                .chain(self.incoming.iter())
                .map(|l| l.capacity() * record)
                .sum::<usize>()
            + self.tombstones.as_words().len() * std::mem::size_of::<u64>();

        TopologyStats {
            node_count,
            edge_count,
            active_edge_count,
            max_out_degree,
            avg_out_degree,
            tombstoned_nodes: self.tombstones.count(),
            memory_bytes,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
