//! # Quiver Core
//!
//! Core types shared by the quiver graph index crates.
//!
//! This crate provides the fundamental building blocks:
//! - [`Handle`] and [`EtypeId`] - Dense integer identifiers for interned strings
//! - [`Direction`] - Edge direction selector for adjacency queries
//! - [`EdgeRecord`] - A single adjacency entry with its validity interval
//! - [`UnknownHandle`] - Resolution failure for out-of-range handles

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Time sentinels
// =============================================================================

/// `valid_to_us` value marking an edge record as still active (open interval).
pub const STILL_ACTIVE: i64 = i64::MAX;

/// `at_us` sentinel meaning "query at present time".
///
/// Shares its value with [`STILL_ACTIVE`]: when a caller asks for `NOW`, the
/// visibility predicate collapses to `valid_to_us == STILL_ACTIVE` and the
/// per-node tombstone bits apply.
pub const NOW: i64 = i64::MAX;

// =============================================================================
// Identifiers (Newtypes for type safety)
// =============================================================================

/// A dense handle for an interned node identifier.
///
/// Handles are issued sequentially from `[0, N)` and, once issued, are never
/// reassigned to a different string, not even after the node is tombstoned.
/// Uses a newtype pattern to prevent mixing up node handles with edge-type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Handle(pub u32);

impl Handle {
    /// Creates a new handle from a u32.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the handle as a usize for indexing.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

impl From<u32> for Handle {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<usize> for Handle {
    #[inline]
    fn from(id: usize) -> Self {
        Self(id as u32)
    }
}

/// A dense identifier for an interned edge-type label.
///
/// The edge-type dictionary has low expected cardinality (tens to low
/// thousands of labels), but ids are kept at u32 to match the snapshot wire
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EtypeId(pub u32);

impl EtypeId {
    /// Creates a new edge-type id from a u32.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EtypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl From<u32> for EtypeId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// =============================================================================
// Direction
// =============================================================================

/// Which adjacency list a traversal walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Follow edges from source to target.
    Outgoing,
    /// Follow edges from target back to source.
    Incoming,
}

impl Direction {
    /// Returns the opposite direction.
    #[inline]
    pub const fn reverse(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
        }
    }
}

// =============================================================================
// Edge records
// =============================================================================

/// A single adjacency entry.
///
/// In an outgoing list `peer` is the edge's target; in an incoming list it is
/// the edge's source. The two mirror copies of a logical edge carry identical
/// validity intervals. Records are never mutated except to close an open
/// interval; a logical deletion is a closed interval, not a removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// The handle at the other end of the edge.
    pub peer: Handle,
    /// Edge-type dictionary id.
    pub etype: EtypeId,
    /// Start of validity, microseconds since Unix epoch.
    pub valid_from_us: i64,
    /// End of validity (exclusive); [`STILL_ACTIVE`] for open intervals.
    pub valid_to_us: i64,
}

impl EdgeRecord {
    /// Creates a record with an open validity interval.
    pub const fn active(peer: Handle, etype: EtypeId, valid_from_us: i64) -> Self {
        Self {
            peer,
            etype,
            valid_from_us,
            valid_to_us: STILL_ACTIVE,
        }
    }

    /// Returns true if the interval is still open.
    #[inline]
    pub const fn is_active(&self) -> bool {
        self.valid_to_us == STILL_ACTIVE
    }

    /// Checks visibility at a point in time.
    ///
    /// `at_us == NOW` reduces to the open-interval check; otherwise the
    /// half-open predicate `valid_from_us <= at < valid_to_us` applies.
    #[inline]
    pub fn is_visible_at(&self, at_us: i64) -> bool {
        if at_us == NOW {
            self.is_active()
        } else {
            self.valid_from_us <= at_us && at_us < self.valid_to_us
        }
    }

    /// Compaction sort key: `(etype, peer, valid_from, valid_to)`.
    #[inline]
    pub fn sort_key(&self) -> (u32, u32, i64, i64) {
        (
            self.etype.as_u32(),
            self.peer.as_u32(),
            self.valid_from_us,
            self.valid_to_us,
        )
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Resolution of a handle that was never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown handle h{0}")]
pub struct UnknownHandle(pub u32);

// =============================================================================
// Tests
// =============================================================================
