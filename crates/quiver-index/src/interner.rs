//! String interning for node identifiers and edge-type labels.
//!
//! The durable store addresses nodes by opaque string identifiers (UUIDs,
//! composite keys). The topology index works in dense u32 handles instead;
//! this module provides the bidirectional mapping between the two.
//!
//! Interners are append-only: a handle, once issued, stays bound to its
//! string for the lifetime of the index. Tombstoned nodes keep their entry;
//! retaining the string memory is the accepted cost of handle stability.

use quiver_core::UnknownHandle;
use std::collections::HashMap;

/// A bidirectional map between strings and dense u32 handles.
///
/// Serves both the node namespace and the edge-type dictionary; callers wrap
/// the raw u32 into [`quiver_core::Handle`] or [`quiver_core::EtypeId`] at
/// the facade level.
#[derive(Debug, Clone, Default)]
pub struct Interner {
    /// string -> handle; every key unique.
    forward: HashMap<String, u32>,
    /// handle -> string; position is the handle.
    reverse: Vec<String>,
}

impl Interner {
    /// Creates an empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string: returns the existing handle if present, otherwise
    /// appends and returns a fresh one. O(1) average.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.forward.get(s) {
            return id;
        }
        let id = self.reverse.len() as u32;
        let owned = s.to_string();
        self.reverse.push(owned.clone());
        self.forward.insert(owned, id);
        id
    }

    /// Forward lookup without interning. O(1) average.
    pub fn lookup(&self, s: &str) -> Option<u32> {
        self.forward.get(s).copied()
    }

    /// Reverse lookup. O(1) worst case.
    ///
    /// Fails only when the handle was never issued.
    pub fn resolve(&self, id: u32) -> Result<&str, UnknownHandle> {
        self.reverse
            .get(id as usize)
            .map(|s| s.as_str())
            .ok_or(UnknownHandle(id))
    }

    /// Reverse lookup returning `None` for unissued handles.
    pub fn get(&self, id: u32) -> Option<&str> {
        self.reverse.get(id as usize).map(|s| s.as_str())
    }

    /// Current handle count.
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    /// Returns true if nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Iterates the interned strings in handle order.
    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.reverse.iter().map(|s| s.as_str())
    }

    /// Rebuilds an interner from a handle-ordered string sequence, as decoded
    /// from a snapshot. A duplicate entry means the sequence cannot have come
    /// from a valid interner.
    pub fn from_strings(strings: Vec<String>) -> Result<Self, String> {
        let mut forward = HashMap::with_capacity(strings.len());
        for (id, s) in strings.iter().enumerate() {
            if forward.insert(s.clone(), id as u32).is_some() {
                return Err(format!("duplicate interned string {:?}", s));
            }
        }
        Ok(Self {
            forward,
            reverse: strings,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
