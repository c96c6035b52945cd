//! Banish propagation over the match graph.
//!
//! Nodes are `(doc_id, window_id)` endpoints packed into dense u64 keys;
//! edges connect the two endpoints of every match row. A multi-source BFS
//! from every window of a banished document marks the nodes at shortest
//! path distance strictly less than the banish distance, and every match
//! row touching a marked node is deleted.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::store::Store;

/// Delete matches reachable from the banished documents' windows.
/// No-op when `banished` is empty.
pub fn banish_matches(
    banished: &BTreeSet<u32>,
    distance: u32,
    store: &dyn Store,
) -> Result<(), PipelineError> {
    if banished.is_empty() {
        return Ok(());
    }
    info!(documents = banished.len(), distance, "banishing matches");

    let rows = store.all_matches()?;
    let mut graph = MatchGraph::default();
    for row in &rows {
        graph.add_edge(
            pack(row.doc_a, row.window_a),
            pack(row.doc_b, row.window_b),
        );
    }

    let seeds: Vec<u32> = graph
        .keys
        .iter()
        .enumerate()
        .filter(|(_, key)| banished.contains(&unpack(**key).0))
        .map(|(idx, _)| idx as u32)
        .collect();

    let marked = graph.nodes_within(&seeds, distance);
    let endpoints: HashSet<(u32, u32)> = marked
        .into_iter()
        .map(|idx| unpack(graph.keys[idx as usize]))
        .collect();
    debug!(endpoints = endpoints.len(), "banish frontier computed");
    store.delete_matches(&endpoints)?;
    Ok(())
}

#[inline]
fn pack(doc_id: u32, window_id: u32) -> u64 {
    (u64::from(doc_id) << 32) | u64::from(window_id)
}

#[inline]
fn unpack(key: u64) -> (u32, u32) {
    ((key >> 32) as u32, key as u32)
}

/// Undirected graph over packed endpoint keys with dense node indices and
/// adjacency lists in a growable arena.
#[derive(Default)]
struct MatchGraph {
    index: HashMap<u64, u32>,
    keys: Vec<u64>,
    adjacency: Vec<Vec<u32>>,
}

impl MatchGraph {
    fn intern(&mut self, key: u64) -> u32 {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.keys.len() as u32;
        self.index.insert(key, idx);
        self.keys.push(key);
        self.adjacency.push(Vec::new());
        idx
    }

    fn add_edge(&mut self, a: u64, b: u64) {
        let ia = self.intern(a);
        let ib = self.intern(b);
        self.adjacency[ia as usize].push(ib);
        self.adjacency[ib as usize].push(ia);
    }

    /// Node indices at BFS distance strictly less than `distance` from any
    /// seed. Seeds themselves are at distance zero.
    fn nodes_within(&self, seeds: &[u32], distance: u32) -> Vec<u32> {
        let mut visited = BitSet::new(self.keys.len());
        let mut queue: VecDeque<(u32, u32)> = VecDeque::new();
        let mut marked = Vec::new();
        for &seed in seeds {
            if visited.insert(seed as usize) {
                queue.push_back((seed, 0));
            }
        }
        while let Some((node, d)) = queue.pop_front() {
            if d >= distance {
                continue;
            }
            marked.push(node);
            for &next in &self.adjacency[node as usize] {
                if visited.insert(next as usize) {
                    queue.push_back((next, d + 1));
                }
            }
        }
        marked
    }
}

/// Fixed-size bitset over node indices.
struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// Returns true when the bit was newly set.
    fn insert(&mut self, idx: usize) -> bool {
        let word = idx / 64;
        let mask = 1u64 << (idx % 64);
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(edges: &[((u32, u32), (u32, u32))]) -> MatchGraph {
        let mut g = MatchGraph::default();
        for &((da, wa), (db, wb)) in edges {
            g.add_edge(pack(da, wa), pack(db, wb));
        }
        g
    }

    fn marked_endpoints(g: &MatchGraph, banished_doc: u32, distance: u32) -> HashSet<(u32, u32)> {
        let seeds: Vec<u32> = g
            .keys
            .iter()
            .enumerate()
            .filter(|(_, key)| unpack(**key).0 == banished_doc)
            .map(|(idx, _)| idx as u32)
            .collect();
        g.nodes_within(&seeds, distance)
            .into_iter()
            .map(|idx| unpack(g.keys[idx as usize]))
            .collect()
    }

    #[test]
    fn pack_unpack_roundtrip() {
        assert_eq!(unpack(pack(7, 12)), (7, 12));
        assert_eq!(unpack(pack(u32::MAX, 0)), (u32::MAX, 0));
    }

    #[test]
    fn distance_is_strictly_less_than_limit() {
        // Chain: (1,0) - (0,0) - (2,0) - (3,0); doc 1 banished.
        let g = graph_of(&[
            ((1, 0), (0, 0)),
            ((0, 0), (2, 0)),
            ((2, 0), (3, 0)),
        ]);
        // D = 2: seeds (dist 0) and direct neighbors (dist 1) are marked;
        // (2,0) at dist 2 is not.
        let marked = marked_endpoints(&g, 1, 2);
        assert!(marked.contains(&(1, 0)));
        assert!(marked.contains(&(0, 0)));
        assert!(!marked.contains(&(2, 0)));
        assert!(!marked.contains(&(3, 0)));
    }

    #[test]
    fn components_without_seeds_are_untouched() {
        let g = graph_of(&[((1, 0), (0, 0)), ((4, 2), (5, 3))]);
        let marked = marked_endpoints(&g, 1, 4);
        assert!(marked.contains(&(0, 0)));
        assert!(!marked.contains(&(4, 2)));
        assert!(!marked.contains(&(5, 3)));
    }

    #[test]
    fn zero_distance_marks_nothing() {
        let g = graph_of(&[((1, 0), (0, 0))]);
        assert!(marked_endpoints(&g, 1, 0).is_empty());
    }
}
