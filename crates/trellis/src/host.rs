// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host location tracking (MAC address to attachment point).

use crate::topology::Point;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use trellis_openflow::MacAddr;

/// Result of [`HostTracker::learn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Learn {
    Unchanged,
    New,
    /// The host moved away from this point.
    Moved(Point),
}

#[derive(Debug, Default)]
struct Tables {
    by_addr: HashMap<MacAddr, Point>,
    by_point: HashMap<Point, BTreeSet<MacAddr>>,
}

impl Tables {
    fn unlink(&mut self, addr: MacAddr, point: Point) {
        if let Some(addrs) = self.by_point.get_mut(&point) {
            addrs.remove(&addr);
            if addrs.is_empty() {
                self.by_point.remove(&point);
            }
        }
    }

    fn forget(&mut self, point: Point) -> Vec<MacAddr> {
        let addrs: Vec<MacAddr> = self
            .by_point
            .remove(&point)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for addr in &addrs {
            self.by_addr.remove(addr);
        }
        addrs
    }
}

/// Bidirectional host table: each address maps to exactly one point.
#[derive(Debug, Default)]
pub struct HostTracker {
    tables: RwLock<Tables>,
}

impl HostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `addr` at `point`, evicting any previous location.
    pub fn learn(&self, addr: MacAddr, point: Point) -> Learn {
        let mut tables = self.tables.write();
        let previous = tables.by_addr.insert(addr, point);
        match previous {
            Some(old) if old == point => Learn::Unchanged,
            Some(old) => {
                tables.unlink(addr, old);
                tables.by_point.entry(point).or_default().insert(addr);
                Learn::Moved(old)
            }
            None => {
                tables.by_point.entry(point).or_default().insert(addr);
                Learn::New
            }
        }
    }

    /// Drop every host at `point`; returns the addresses removed.
    pub fn forget(&self, point: Point) -> Vec<MacAddr> {
        self.tables.write().forget(point)
    }

    /// Drop every host attached to switch `dpid`.
    pub fn forget_device(&self, dpid: u64) -> Vec<MacAddr> {
        let mut tables = self.tables.write();
        let points: Vec<Point> = tables
            .by_point
            .keys()
            .filter(|p| p.dpid == dpid)
            .copied()
            .collect();
        points.into_iter().flat_map(|p| tables.forget(p)).collect()
    }

    /// Drop a single host wherever it is.
    pub fn forget_addr(&self, addr: MacAddr) -> Option<Point> {
        let mut tables = self.tables.write();
        let point = tables.by_addr.remove(&addr)?;
        tables.unlink(addr, point);
        Some(point)
    }

    pub fn lookup(&self, addr: MacAddr) -> Option<Point> {
        self.tables.read().by_addr.get(&addr).copied()
    }

    pub fn hosts_at(&self, point: Point) -> Vec<MacAddr> {
        self.tables
            .read()
            .by_point
            .get(&point)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().by_addr.is_empty()
    }
}
