//! Backtracking subgraph isomorphism over edge-constraint patterns.
//!
//! A pattern is an ordered list of [`PatternEdge`] constraints over numbered
//! variables; variable 0 is seeded by the caller. The matcher walks the
//! constraints in input order, extending a partial assignment: a constraint
//! with both ends bound is verified against the topology, a constraint with
//! one bound end enumerates candidates from the corresponding adjacency
//! direction, and a constraint with neither end bound is rejected with
//! [`PatternError::Unbound`]: orderings that would require enumerating all
//! node pairs are the caller's mistake, not a search strategy.
//!
//! Assignments are injective: no two variables bind the same node, making
//! results subgraph isomorphisms rather than homomorphisms.

use quiver_core::{EtypeId, Handle, NOW};
use quiver_index::GraphIndex;
use std::collections::HashSet;
use thiserror::Error;

/// A single pattern constraint: an `etype` edge from `src_var` to `dst_var`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternEdge {
    /// Variable at the edge source.
    pub src_var: u32,
    /// Variable at the edge target.
    pub dst_var: u32,
    /// Required edge type.
    pub etype: EtypeId,
}

/// Errors raised while evaluating a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A constraint was reached with both of its variables unbound.
    #[error("pattern constraint {0} has both endpoints unbound")]
    Unbound(usize),
}

/// Backtracking matcher over a pattern of edge constraints.
pub struct Matcher<'a> {
    index: &'a GraphIndex,
    pattern: &'a [PatternEdge],
    num_vars: usize,
    max_results: Option<usize>,
}

impl<'a> Matcher<'a> {
    /// Creates a matcher. The variable count is `1 + max(var_id)` over the
    /// pattern; an empty pattern has the single seed variable.
    pub fn new(index: &'a GraphIndex, pattern: &'a [PatternEdge]) -> Self {
        let max_var = pattern
            .iter()
            .map(|e| e.src_var.max(e.dst_var))
            .max()
            .unwrap_or(0);
        Self {
            index,
            pattern,
            num_vars: max_var as usize + 1,
            max_results: None,
        }
    }

    /// Caps the number of emitted assignments.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Number of pattern variables.
    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// Finds every injective assignment satisfying the pattern, seeding
    /// variable 0 from `seeds` in order. Matching is evaluated against edges
    /// visible at `at_us`; tombstoned seeds are skipped for present-time
    /// matching.
    pub fn find_matches(
        &self,
        seeds: &[Handle],
        at_us: i64,
    ) -> Result<Vec<Vec<Handle>>, PatternError> {
        let mut results = Vec::new();
        let mut assignment: Vec<Option<Handle>> = vec![None; self.num_vars];
        let mut used = HashSet::new();
        let mut seen_seeds = HashSet::new();

        for &seed in seeds {
            if !seen_seeds.insert(seed) {
                continue;
            }
            if at_us == NOW && self.index.is_tombstoned(seed) {
                continue;
            }
            assignment[0] = Some(seed);
            used.insert(seed);

            self.solve(0, &mut assignment, &mut used, &mut results, at_us)?;

            used.remove(&seed);
            assignment[0] = None;

            if self.hit_cap(&results) {
                break;
            }
        }
        Ok(results)
    }

    fn hit_cap(&self, results: &[Vec<Handle>]) -> bool {
        self.max_results.is_some_and(|cap| results.len() >= cap)
    }

    fn solve(
        &self,
        constraint: usize,
        assignment: &mut Vec<Option<Handle>>,
        used: &mut HashSet<Handle>,
        results: &mut Vec<Vec<Handle>>,
        at_us: i64,
    ) -> Result<(), PatternError> {
        if self.hit_cap(results) {
            return Ok(());
        }
        if constraint == self.pattern.len() {
            // A variable id gap (e.g. vars 0 and 2 used, 1 never referenced)
            // leaves a hole; such degenerate patterns match nothing.
            if let Some(tuple) = assignment.iter().copied().collect::<Option<Vec<_>>>() {
                results.push(tuple);
            }
            return Ok(());
        }

        let edge = self.pattern[constraint];
        let s = edge.src_var as usize;
        let d = edge.dst_var as usize;

        match (assignment[s], assignment[d]) {
            (Some(src), Some(dst)) => {
                if self.index.has_active_edge(src, dst, edge.etype, at_us) {
                    self.solve(constraint + 1, assignment, used, results, at_us)?;
                }
            }
            (Some(src), None) => {
                for candidate in self.index.active_out(src, edge.etype, at_us) {
                    if used.contains(&candidate) {
                        continue;
                    }
                    assignment[d] = Some(candidate);
                    used.insert(candidate);
                    self.solve(constraint + 1, assignment, used, results, at_us)?;
                    used.remove(&candidate);
                    assignment[d] = None;
                }
            }
            (None, Some(dst)) => {
                for candidate in self.index.active_in(dst, edge.etype, at_us) {
                    if used.contains(&candidate) {
                        continue;
                    }
                    assignment[s] = Some(candidate);
                    used.insert(candidate);
                    self.solve(constraint + 1, assignment, used, results, at_us)?;
                    used.remove(&candidate);
                    assignment[s] = None;
                }
            }
            (None, None) => return Err(PatternError::Unbound(constraint)),
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
