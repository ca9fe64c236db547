// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimum spanning forest (Kruskal over a disjoint-set).

use super::Point;
use std::collections::{BTreeSet, HashMap};

/// Disjoint-set with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge the sets holding `a` and `b`; false if already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// Candidate edge: `(weight, lower point, upper point)`.
pub type WeightedEdge = (u32, Point, Point);

/// Select the spanning-forest edges.
///
/// Edges are scanned in `(weight, lower, upper)` order, so equal weights
/// break ties deterministically. Edges touching unknown vertices are skipped.
pub fn spanning_forest(
    vertices: &BTreeSet<u64>,
    mut edges: Vec<WeightedEdge>,
) -> BTreeSet<(Point, Point)> {
    edges.sort_unstable();

    let index: HashMap<u64, usize> = vertices.iter().enumerate().map(|(i, v)| (*v, i)).collect();
    let mut sets = UnionFind::new(vertices.len());
    let wanted = vertices.len().saturating_sub(1);
    let mut chosen = BTreeSet::new();

    for (_, lo, hi) in edges {
        if chosen.len() == wanted {
            break;
        }
        let (Some(&a), Some(&b)) = (index.get(&lo.dpid), index.get(&hi.dpid)) else {
            continue;
        };
        if sets.union(a, b) {
            chosen.insert((lo, hi));
        }
    }
    chosen
}
