// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network topology: switches as vertices, discovered links as edges.
//!
//! The [`Graph`] keeps a minimum spanning forest over its edges so that
//! forwarding never loops. [`Topology`] is the shared, locked handle that
//! the rest of the controller uses.

pub mod forest;
pub mod graph;

pub use graph::Graph;

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Topology error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("unknown endpoint: datapath {0:#018x} is not in the graph")]
    UnknownEndpoint(u64),
}

/// A switch port: `(dpid, port)`, ordered by dpid then port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    pub dpid: u64,
    pub port: u32,
}

impl Point {
    pub const fn new(dpid: u64, port: u32) -> Self {
        Self { dpid, port }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}/{}", self.dpid, self.port)
    }
}

/// Undirected link between two points. `a` is always the lower point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub a: Point,
    pub b: Point,
    pub weight: u32,
}

impl Edge {
    pub fn new(p: Point, q: Point, weight: u32) -> Self {
        let (a, b) = if p <= q { (p, q) } else { (q, p) };
        Self { a, b, weight }
    }

    /// Identity of the link, independent of weight.
    pub fn key(&self) -> (Point, Point) {
        (self.a, self.b)
    }

    /// Endpoint on switch `dpid`.
    pub fn point_at(&self, dpid: u64) -> Option<Point> {
        if self.a.dpid == dpid {
            Some(self.a)
        } else if self.b.dpid == dpid {
            Some(self.b)
        } else {
            None
        }
    }

    /// Switch at the far end from `dpid`.
    pub fn other(&self, dpid: u64) -> Option<u64> {
        if self.a.dpid == dpid {
            Some(self.b.dpid)
        } else if self.b.dpid == dpid {
            Some(self.a.dpid)
        } else {
            None
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {} (weight {})", self.a, self.b, self.weight)
    }
}

/// One step of a path: leave `vertex` over `edge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub vertex: u64,
    pub edge: Edge,
}

impl Hop {
    /// Port the traffic leaves `vertex` through.
    pub fn egress(&self) -> Point {
        self.edge.point_at(self.vertex).unwrap_or(self.edge.a)
    }

    /// Port the traffic enters the next switch through.
    pub fn ingress(&self) -> Point {
        let egress = self.egress();
        if egress == self.edge.a {
            self.edge.b
        } else {
            self.edge.a
        }
    }
}

/// Outcome of a graph mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyChange {
    /// The graph structure changed and the forest was recomputed.
    pub changed: bool,
    /// Endpoints of edges that went from enabled to disabled.
    pub disabled: Vec<Point>,
}

impl TopologyChange {
    pub fn none() -> Self {
        Self::default()
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: TopologyChange) {
        self.changed |= other.changed;
        self.disabled.extend(other.disabled);
    }
}

/// 802.1D-1998 path cost for a link running at `speed_mbps`.
pub fn link_weight(speed_mbps: u64) -> u32 {
    match speed_mbps {
        s if s >= 40_000 => 1,
        s if s >= 10_000 => 2,
        s if s >= 1_000 => 4,
        s if s >= 622 => 6,
        s if s >= 155 => 14,
        s if s >= 100 => 19,
        s if s >= 45 => 39,
        s if s >= 16 => 62,
        s if s >= 10 => 100,
        _ => 250,
    }
}

/// Shared topology handle.
///
/// One coarse lock covers mutations and queries. The guard never escapes a
/// method, so callers can await freely between calls.
#[derive(Debug, Default)]
pub struct Topology {
    graph: Mutex<Graph>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&self, dpid: u64) -> TopologyChange {
        self.graph.lock().add_vertex(dpid)
    }

    pub fn remove_vertex(&self, dpid: u64) -> TopologyChange {
        self.graph.lock().remove_vertex(dpid)
    }

    pub fn add_edge(&self, edge: Edge) -> Result<TopologyChange, TopologyError> {
        self.graph.lock().add_edge(edge, Instant::now())
    }

    pub fn remove_edge(&self, edge: &Edge) -> TopologyChange {
        self.graph.lock().remove_edge(edge)
    }

    pub fn remove_point(&self, point: Point) -> TopologyChange {
        self.graph.lock().remove_point(point)
    }

    /// Expire edges not refreshed within `max_age`.
    pub fn remove_stale(&self, max_age: Duration) -> (Vec<Edge>, TopologyChange) {
        self.graph.lock().remove_stale(Instant::now(), max_age)
    }

    pub fn find_path(&self, src: u64, dst: u64) -> Vec<Hop> {
        self.graph.lock().find_path(src, dst)
    }

    pub fn is_edge(&self, point: Point) -> bool {
        self.graph.lock().is_edge(point)
    }

    pub fn is_enabled(&self, point: Point) -> bool {
        self.graph.lock().is_enabled(point)
    }

    pub fn has_vertex(&self, dpid: u64) -> bool {
        self.graph.lock().has_vertex(dpid)
    }

    pub fn vertices(&self) -> Vec<u64> {
        self.graph.lock().vertices()
    }

    pub fn edges(&self) -> Vec<(Edge, bool)> {
        self.graph.lock().edges()
    }
}
