//! End-to-end scenarios over the index and engine.

use quiver_core::{Direction, EtypeId, Handle, NOW, STILL_ACTIVE};
use quiver_engine::{traverse_bounded, Matcher, PatternEdge};
use quiver_index::{GraphIndex, SnapshotError};

fn sorted(mut handles: Vec<Handle>) -> Vec<Handle> {
    handles.sort();
    handles
}

fn chain_index() -> (GraphIndex, Vec<Handle>, EtypeId) {
    // A -> B -> C -> D -> E, all NEXT, active since t=0.
    let mut index = GraphIndex::new();
    for (s, t) in [("A", "B"), ("B", "C"), ("C", "D"), ("D", "E")] {
        index.add_edge(s, t, "NEXT", 0, STILL_ACTIVE).unwrap();
    }
    let handles = index.resolve_seeds(&["A", "B", "C", "D", "E"]);
    let next = index.lookup_etype("NEXT").unwrap();
    (index, handles, next)
}

#[test]
fn chain_traversal_depth_windows() {
    let (index, h, next) = chain_index();
    let bounded = |min, max| {
        sorted(traverse_bounded(
            &index,
            &[h[0]],
            next,
            Direction::Outgoing,
            min,
            max,
            NOW,
        ))
    };

    assert_eq!(bounded(1, 2), vec![h[1], h[2]]);
    assert_eq!(bounded(2, 4), vec![h[2], h[3], h[4]]);
    assert_eq!(bounded(1, 10), vec![h[1], h[2], h[3], h[4]]);
}

#[test]
fn cycle_emits_each_node_once() {
    // A -> B -> A, both LOOP.
    let mut index = GraphIndex::new();
    index.add_edge("A", "B", "LOOP", 0, STILL_ACTIVE).unwrap();
    index.add_edge("B", "A", "LOOP", 0, STILL_ACTIVE).unwrap();
    let a = index.lookup_node("A").unwrap();
    let b = index.lookup_node("B").unwrap();
    let t = index.lookup_etype("LOOP").unwrap();

    let out = traverse_bounded(&index, &[a], t, Direction::Outgoing, 1, 5, NOW);
    assert_eq!(out, vec![b]);
}

#[test]
fn temporal_edge_visibility() {
    let mut index = GraphIndex::new();
    index.add_edge("A", "B", "LINK", 1_000, STILL_ACTIVE).unwrap();
    assert!(index.remove_edge("A", "B", "LINK", 2_000));
    index.add_edge("A", "C", "LINK", 3_000, STILL_ACTIVE).unwrap();

    let a = index.lookup_node("A").unwrap();
    let b = index.lookup_node("B").unwrap();
    let c = index.lookup_node("C").unwrap();
    let link = index.lookup_etype("LINK").unwrap();

    assert_eq!(index.active_out(a, link, 1_500), vec![b]);
    assert!(index.active_out(a, link, 2_500).is_empty());
    assert_eq!(index.active_out(a, link, 3_500), vec![c]);
}

#[test]
fn duplicate_edges_collapse_at_compaction() {
    let mut index = GraphIndex::new();
    for _ in 0..3 {
        index.add_edge("A", "B", "K", 0, STILL_ACTIVE).unwrap();
    }
    let a = index.lookup_node("A").unwrap();
    let b = index.lookup_node("B").unwrap();
    let k = index.lookup_etype("K").unwrap();

    assert_eq!(index.topology().outgoing_records(a).len(), 3);
    index.compact();
    assert_eq!(index.topology().outgoing_records(a).len(), 1);

    let out = quiver_engine::traverse(&index, &[a], k, Direction::Outgoing, NOW);
    assert_eq!(out, vec![b]);
}

#[test]
fn triangle_pattern_match() {
    let mut index = GraphIndex::new();
    for (s, t) in [("A", "B"), ("B", "C"), ("C", "A")] {
        index.add_edge(s, t, "NEXT", 0, STILL_ACTIVE).unwrap();
    }
    let h = index.resolve_seeds(&["A", "B", "C"]);
    let next = index.lookup_etype("NEXT").unwrap();

    let pattern = [
        PatternEdge { src_var: 0, dst_var: 1, etype: next },
        PatternEdge { src_var: 1, dst_var: 2, etype: next },
        PatternEdge { src_var: 2, dst_var: 0, etype: next },
    ];
    let matches = Matcher::new(&index, &pattern)
        .find_matches(&[h[0]], NOW)
        .unwrap();
    assert_eq!(matches, vec![vec![h[0], h[1], h[2]]]);
}

#[test]
fn snapshot_warm_start_preserves_traversals() {
    let (index, h, next) = chain_index();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain.qgph");
    index.save_snapshot(&path).unwrap();

    let loaded = GraphIndex::load_snapshot(&path).unwrap();
    for (min, max) in [(1, 2), (2, 4), (1, 10)] {
        let before = sorted(traverse_bounded(
            &index,
            &[h[0]],
            next,
            Direction::Outgoing,
            min,
            max,
            NOW,
        ));
        let after = sorted(traverse_bounded(
            &loaded,
            &[h[0]],
            next,
            Direction::Outgoing,
            min,
            max,
            NOW,
        ));
        assert_eq!(before, after);
    }

    // A single flipped byte must be rejected.
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();
    let err = GraphIndex::load_snapshot(&path).unwrap_err();
    assert!(matches!(err, SnapshotError::Corrupt(_)), "{err}");
}
