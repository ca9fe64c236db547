// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Switch port state.

use std::time::{Duration, Instant};
use trellis_openflow::PortDesc;

/// Result of applying a port update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortTransition {
    Unchanged,
    Up,
    Down,
}

/// A port as tracked by the controller.
#[derive(Debug, Clone)]
pub struct Port {
    desc: PortDesc,
    /// Last up/down change, start of the settling window.
    changed_at: Instant,
}

impl Port {
    pub fn new(desc: PortDesc, now: Instant) -> Self {
        Self {
            desc,
            changed_at: now,
        }
    }

    pub fn number(&self) -> u32 {
        self.desc.number
    }

    pub fn desc(&self) -> &PortDesc {
        &self.desc
    }

    pub fn is_up(&self) -> bool {
        self.desc.is_up()
    }

    pub fn changed_at(&self) -> Instant {
        self.changed_at
    }

    /// Up, and up for at least `window`.
    pub fn is_settled(&self, now: Instant, window: Duration) -> bool {
        self.is_up() && now.saturating_duration_since(self.changed_at) >= window
    }

    /// Replace the description and report any up/down change.
    pub fn update(&mut self, desc: PortDesc, now: Instant) -> PortTransition {
        let was_up = self.is_up();
        self.desc = desc;
        match (was_up, self.is_up()) {
            (false, true) => {
                self.changed_at = now;
                PortTransition::Up
            }
            (true, false) => {
                self.changed_at = now;
                PortTransition::Down
            }
            _ => PortTransition::Unchanged,
        }
    }
}
