// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Switch/link graph with a loop-free spanning forest.
//!
//! Every structural change recomputes the forest. Edges outside it stay in
//! the graph but are disabled: traffic arriving on them is dropped and paths
//! never use them.

use super::forest::spanning_forest;
use super::{Edge, Hop, Point, TopologyChange, TopologyError};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct EdgeEntry {
    weight: u32,
    enabled: bool,
    last_seen: Instant,
}

/// Topology graph. Not synchronized; see [`super::Topology`].
#[derive(Debug, Default)]
pub struct Graph {
    vertices: BTreeSet<u64>,
    edges: BTreeMap<(Point, Point), EdgeEntry>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, dpid: u64) -> TopologyChange {
        if !self.vertices.insert(dpid) {
            return TopologyChange::none();
        }
        self.recompute()
    }

    /// Remove a vertex with every edge touching it.
    pub fn remove_vertex(&mut self, dpid: u64) -> TopologyChange {
        if !self.vertices.remove(&dpid) {
            return TopologyChange::none();
        }
        self.edges
            .retain(|(lo, hi), _| lo.dpid != dpid && hi.dpid != dpid);
        self.recompute()
    }

    /// Insert `edge`, or refresh its last-seen time if already present.
    pub fn add_edge(&mut self, edge: Edge, now: Instant) -> Result<TopologyChange, TopologyError> {
        for point in [edge.a, edge.b] {
            if !self.vertices.contains(&point.dpid) {
                return Err(TopologyError::UnknownEndpoint(point.dpid));
            }
        }
        if let Some(entry) = self.edges.get_mut(&edge.key()) {
            entry.last_seen = now;
            return Ok(TopologyChange::none());
        }
        self.edges.insert(
            edge.key(),
            EdgeEntry {
                weight: edge.weight,
                enabled: false,
                last_seen: now,
            },
        );
        Ok(self.recompute())
    }

    /// Remove the edge between `edge`'s endpoints, whatever its weight.
    pub fn remove_edge(&mut self, edge: &Edge) -> TopologyChange {
        if self.edges.remove(&edge.key()).is_none() {
            return TopologyChange::none();
        }
        self.recompute()
    }

    /// Remove every edge attached to `point`.
    pub fn remove_point(&mut self, point: Point) -> TopologyChange {
        let before = self.edges.len();
        self.edges.retain(|(lo, hi), _| *lo != point && *hi != point);
        if self.edges.len() == before {
            return TopologyChange::none();
        }
        self.recompute()
    }

    /// Remove edges not refreshed within `max_age` of `now`.
    pub fn remove_stale(&mut self, now: Instant, max_age: Duration) -> (Vec<Edge>, TopologyChange) {
        let stale: Vec<Edge> = self
            .edges
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_seen) > max_age)
            .map(|(&(lo, hi), e)| Edge::new(lo, hi, e.weight))
            .collect();
        if stale.is_empty() {
            return (stale, TopologyChange::none());
        }
        for edge in &stale {
            self.edges.remove(&edge.key());
        }
        let change = self.recompute();
        (stale, change)
    }

    fn recompute(&mut self) -> TopologyChange {
        let candidates = self
            .edges
            .iter()
            .map(|(&(lo, hi), e)| (e.weight, lo, hi))
            .collect();
        let forest = spanning_forest(&self.vertices, candidates);

        let mut disabled = Vec::new();
        for (key, entry) in self.edges.iter_mut() {
            let enabled = forest.contains(key);
            if entry.enabled && !enabled {
                disabled.extend([key.0, key.1]);
            }
            entry.enabled = enabled;
        }
        TopologyChange {
            changed: true,
            disabled,
        }
    }

    /// Hops from `src` to `dst` over enabled edges.
    ///
    /// Empty when `src == dst`, either vertex is unknown, or they are in
    /// different trees of the forest.
    pub fn find_path(&self, src: u64, dst: u64) -> Vec<Hop> {
        if src == dst || !self.vertices.contains(&src) || !self.vertices.contains(&dst) {
            return Vec::new();
        }

        let mut adjacency: HashMap<u64, Vec<(u64, Edge)>> = HashMap::new();
        for edge in self.enabled_edges() {
            adjacency.entry(edge.a.dpid).or_default().push((edge.b.dpid, edge));
            adjacency.entry(edge.b.dpid).or_default().push((edge.a.dpid, edge));
        }

        let mut previous: HashMap<u64, (u64, Edge)> = HashMap::new();
        let mut queue = VecDeque::from([src]);
        while let Some(vertex) = queue.pop_front() {
            if vertex == dst {
                break;
            }
            for &(next, edge) in adjacency.get(&vertex).into_iter().flatten() {
                if next != src && !previous.contains_key(&next) {
                    previous.insert(next, (vertex, edge));
                    queue.push_back(next);
                }
            }
        }

        let mut hops = Vec::new();
        let mut vertex = dst;
        while vertex != src {
            let Some(&(from, edge)) = previous.get(&vertex) else {
                return Vec::new();
            };
            hops.push(Hop { vertex: from, edge });
            vertex = from;
        }
        hops.reverse();
        hops
    }

    pub fn has_vertex(&self, dpid: u64) -> bool {
        self.vertices.contains(&dpid)
    }

    /// True if any edge is attached to `point`.
    pub fn is_edge(&self, point: Point) -> bool {
        self.edges.keys().any(|(lo, hi)| *lo == point || *hi == point)
    }

    /// True if an enabled edge is attached to `point`.
    pub fn is_enabled(&self, point: Point) -> bool {
        self.edges
            .iter()
            .any(|((lo, hi), e)| e.enabled && (*lo == point || *hi == point))
    }

    pub fn vertices(&self) -> Vec<u64> {
        self.vertices.iter().copied().collect()
    }

    /// All edges with their enabled flag.
    pub fn edges(&self) -> Vec<(Edge, bool)> {
        self.edges
            .iter()
            .map(|(&(lo, hi), e)| (Edge::new(lo, hi, e.weight), e.enabled))
            .collect()
    }

    pub fn enabled_edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|(_, e)| e.enabled)
            .map(|(&(lo, hi), e)| Edge::new(lo, hi, e.weight))
            .collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::forest::UnionFind;

    /// Edge between vertices `a` and `b`, using the peer id as port number.
    fn link(a: u64, b: u64, weight: u32) -> Edge {
        Edge::new(Point::new(a, b as u32), Point::new(b, a as u32), weight)
    }

    fn graph(vertices: impl IntoIterator<Item = u64>, edges: &[(u64, u64, u32)]) -> Graph {
        let now = Instant::now();
        let mut g = Graph::new();
        for v in vertices {
            g.add_vertex(v);
        }
        for &(a, b, w) in edges {
            g.add_edge(link(a, b, w), now).unwrap();
        }
        g
    }

    fn enabled_weight(g: &Graph) -> u32 {
        g.enabled_edges().iter().map(|e| e.weight).sum()
    }

    #[test]
    fn test_two_components() {
        // 4 vertices, two disjoint links
        let g = graph(1..=4, &[(1, 2, 2), (3, 4, 3)]);
        assert_eq!(g.enabled_edges().len(), 2);
        assert_eq!(enabled_weight(&g), 5);
        assert!(g.find_path(1, 3).is_empty());
        assert_eq!(g.find_path(1, 2).len(), 1);
    }

    #[test]
    fn test_textbook_nine_vertex_graph() {
        let g = graph(
            0..9,
            &[
                (0, 1, 4),
                (0, 7, 8),
                (1, 2, 8),
                (1, 7, 11),
                (2, 3, 7),
                (2, 8, 2),
                (2, 5, 4),
                (3, 4, 9),
                (3, 5, 14),
                (4, 5, 10),
                (5, 6, 2),
                (6, 7, 1),
                (6, 8, 6),
                (7, 8, 7),
            ],
        );
        assert_eq!(g.edge_count(), 14);
        assert_eq!(g.enabled_edges().len(), 8);
        assert_eq!(enabled_weight(&g), 37);

        let path = g.find_path(0, 8);
        let vertices: Vec<u64> = path.iter().map(|h| h.vertex).collect();
        assert_eq!(vertices, vec![0, 7, 6, 5, 2]);
        assert_eq!(path.iter().map(|h| h.edge.weight).sum::<u32>(), 17);
        assert_eq!(path.last().unwrap().edge.other(2), Some(8));
    }

    #[test]
    fn test_path_hops_chain() {
        let g = graph(1..=4, &[(1, 2, 4), (2, 3, 4), (3, 4, 4), (1, 4, 19)]);
        let path = g.find_path(1, 4);
        assert_eq!(path.len(), 3);
        for pair in path.windows(2) {
            let next = pair[0].edge.other(pair[0].vertex);
            assert_eq!(next, Some(pair[1].vertex));
        }
        assert!(path.iter().all(|h| g.is_enabled(h.egress())));
    }

    #[test]
    fn test_empty_paths() {
        let g = graph(1..=2, &[(1, 2, 4)]);
        assert!(g.find_path(1, 1).is_empty());
        assert!(g.find_path(1, 99).is_empty());
        assert!(g.find_path(99, 1).is_empty());
    }

    #[test]
    fn test_add_edge_unknown_endpoint() {
        let mut g = graph([1], &[]);
        let err = g.add_edge(link(1, 2, 4), Instant::now()).unwrap_err();
        assert_eq!(err, TopologyError::UnknownEndpoint(2));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut g = graph(1..=2, &[(1, 2, 4)]);
        // Same points, reversed orientation.
        let again = Edge::new(Point::new(2, 1), Point::new(1, 2), 4);
        let change = g.add_edge(again, Instant::now()).unwrap();
        assert!(!change.changed);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_remove_vertex_is_idempotent() {
        let mut g = graph(1..=3, &[(1, 2, 4), (2, 3, 4)]);
        assert!(g.remove_vertex(2).changed);
        assert_eq!(g.edge_count(), 0);
        assert!(!g.remove_vertex(2).changed);
        assert_eq!(g.vertex_count(), 2);
    }

    #[test]
    fn test_removal_reenables_backup_link() {
        let mut g = graph(1..=3, &[(1, 2, 4), (2, 3, 4), (1, 3, 19)]);
        let backup = Point::new(1, 3);
        assert!(g.is_edge(backup));
        assert!(!g.is_enabled(backup));

        g.remove_edge(&link(1, 2, 0));
        assert!(g.is_enabled(backup));
        assert_eq!(g.find_path(1, 2).len(), 2);
    }

    #[test]
    fn test_cheaper_link_disables_existing() {
        let mut g = graph(1..=3, &[(1, 2, 19), (2, 3, 19), (1, 3, 19)]);
        // Ties broken on points: (1,2) and (1,3) win.
        assert!(!g.is_enabled(Point::new(2, 3)));

        // A second, faster link between 2 and 3 on other ports.
        let fast = Edge::new(Point::new(2, 9), Point::new(3, 9), 1);
        let change = g.add_edge(fast, Instant::now()).unwrap();
        assert!(change.changed);
        assert_eq!(change.disabled, vec![Point::new(1, 3), Point::new(3, 1)]);
        assert_eq!(g.enabled_edges().len(), 2);
        assert!(g.is_enabled(Point::new(2, 9)));
        assert!(!g.is_enabled(Point::new(1, 3)));
    }

    #[test]
    fn test_remove_point() {
        let mut g = graph(1..=3, &[(1, 2, 4), (2, 3, 4)]);
        assert!(g.remove_point(Point::new(2, 3)).changed);
        assert_eq!(g.edge_count(), 1);
        assert!(!g.remove_point(Point::new(2, 3)).changed);
    }

    #[test]
    fn test_remove_stale() {
        let t0 = Instant::now();
        let mut g = graph(1..=3, &[]);
        g.add_edge(link(1, 2, 4), t0).unwrap();
        g.add_edge(link(2, 3, 4), t0).unwrap();
        // refresh one link
        g.add_edge(link(1, 2, 4), t0 + Duration::from_secs(15)).unwrap();

        let (removed, change) = g.remove_stale(t0 + Duration::from_secs(25), Duration::from_secs(20));
        assert_eq!(removed, vec![link(2, 3, 4)]);
        assert!(change.changed);
        assert_eq!(g.edge_count(), 1);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            AddVertex(u64),
            RemoveVertex(u64),
            AddEdge(u64, u32, u64, u32, u32),
            RemovePoint(u64, u32),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u64..8).prop_map(Op::AddVertex),
                (0u64..8).prop_map(Op::RemoveVertex),
                (0u64..8, 1u32..4, 0u64..8, 1u32..4, 1u32..20)
                    .prop_map(|(a, pa, b, pb, w)| Op::AddEdge(a, pa, b, pb, w)),
                (0u64..8, 1u32..4).prop_map(|(v, p)| Op::RemovePoint(v, p)),
            ]
        }

        fn components(vertices: &[u64], edges: &[(Edge, bool)], enabled_only: bool) -> usize {
            let index: HashMap<u64, usize> =
                vertices.iter().enumerate().map(|(i, v)| (*v, i)).collect();
            let mut uf = UnionFind::new(vertices.len());
            let mut count = vertices.len();
            for (edge, enabled) in edges {
                if enabled_only && !enabled {
                    continue;
                }
                if uf.union(index[&edge.a.dpid], index[&edge.b.dpid]) {
                    count -= 1;
                }
            }
            count
        }

        proptest! {
            #[test]
            fn forest_spans_every_component(ops in prop::collection::vec(op(), 1..60)) {
                let now = Instant::now();
                let mut g = Graph::new();
                for op in ops {
                    match op {
                        Op::AddVertex(v) => { g.add_vertex(v); }
                        Op::RemoveVertex(v) => { g.remove_vertex(v); }
                        Op::AddEdge(a, pa, b, pb, w) => {
                            let _ = g.add_edge(Edge::new(Point::new(a, pa), Point::new(b, pb), w), now);
                        }
                        Op::RemovePoint(v, p) => { g.remove_point(Point::new(v, p)); }
                    }

                    let vertices = g.vertices();
                    let edges = g.edges();
                    let enabled: Vec<_> = edges.iter().filter(|(_, on)| *on).collect();

                    // Acyclic: every enabled edge merges two components.
                    let index: HashMap<u64, usize> =
                        vertices.iter().enumerate().map(|(i, v)| (*v, i)).collect();
                    let mut uf = UnionFind::new(vertices.len());
                    for (edge, _) in &enabled {
                        prop_assert!(uf.union(index[&edge.a.dpid], index[&edge.b.dpid]));
                    }

                    // Spanning: same components with or without disabled edges.
                    let all = components(&vertices, &edges, false);
                    prop_assert_eq!(components(&vertices, &edges, true), all);
                    prop_assert_eq!(enabled.len(), vertices.len() - all);
                }
            }
        }
    }
}
