//! Hop-bounded traversal over the topology index.
//!
//! Both entry points apply the temporal filter per hop through
//! [`GraphIndex::active_neighbors`], so a traversal at a historical timestamp
//! walks the graph as it existed then, while `at_us == NOW` additionally
//! hides tombstoned nodes.
//!
//! Result order is unspecified; callers must not depend on it. In practice it
//! follows adjacency iteration order, which is stable once the topology has
//! been compacted.

use quiver_core::{Direction, EtypeId, Handle};
use quiver_index::GraphIndex;
use std::collections::HashSet;

/// Single-hop traversal with set semantics: every endpoint reachable from any
/// seed over one visible `etype` edge, each reported once.
pub fn traverse(
    index: &GraphIndex,
    seeds: &[Handle],
    etype: EtypeId,
    dir: Direction,
    at_us: i64,
) -> Vec<Handle> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &seed in seeds {
        for peer in index.active_neighbors(seed, etype, dir, at_us) {
            if seen.insert(peer) {
                out.push(peer);
            }
        }
    }
    out
}

/// Breadth-first traversal emitting nodes whose shortest depth `d` from the
/// seed frontier satisfies `min_depth <= d <= max_depth`.
///
/// The visited set is pre-seeded with the start frontier, so the result is a
/// forest: each reachable node appears at most once, at its shortest depth,
/// and a cycle back to a seed never re-emits it. `max_depth == 0` and
/// `min_depth > max_depth` both yield an empty result; seeds themselves are
/// never emitted, consistent with hop semantics.
pub fn traverse_bounded(
    index: &GraphIndex,
    seeds: &[Handle],
    etype: EtypeId,
    dir: Direction,
    min_depth: u32,
    max_depth: u32,
    at_us: i64,
) -> Vec<Handle> {
    if seeds.is_empty() || max_depth == 0 || min_depth > max_depth {
        return Vec::new();
    }

    let mut visited: HashSet<Handle> = seeds.iter().copied().collect();
    let mut frontier: Vec<Handle> = visited.iter().copied().collect();
    let mut out = Vec::new();

    for depth in 1..=max_depth {
        let mut next = Vec::new();
        for &node in &frontier {
            for peer in index.active_neighbors(node, etype, dir, at_us) {
                if visited.insert(peer) {
                    if depth >= min_depth {
                        out.push(peer);
                    }
                    next.push(peer);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
