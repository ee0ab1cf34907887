//! Bounded snapshot history backing pause, reverse and jump-back.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::Tick;
use crate::agent::Agent;

/// Deep copy of every agent at the end of one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldSnapshot {
    pub tick: Tick,
    /// Simulated seconds since reset.
    pub timestamp: f64,
    /// Agents in arena order.
    pub agents: Vec<Agent>,
}

impl WorldSnapshot {
    #[must_use]
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.id == id)
    }
}

/// Position of the replay cursor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "cursor", content = "index")]
pub enum Cursor {
    /// Tracking the newest snapshot.
    #[default]
    Live,
    /// Rewound to the snapshot at this index.
    At(usize),
}

/// Outcome of a jump-back request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JumpReport {
    /// Ticks asked for.
    pub requested: usize,
    /// Ticks actually rewound after clamping to the oldest snapshot.
    pub jumped: usize,
}

impl JumpReport {
    #[must_use]
    pub fn clamped(&self) -> bool {
        self.jumped < self.requested
    }
}

#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    snapshots: VecDeque<WorldSnapshot>,
    cursor: Cursor,
}

impl HistoryBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            snapshots: VecDeque::with_capacity(capacity.clamp(1, 4_096)),
            cursor: Cursor::Live,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.cursor == Cursor::Live
    }

    fn cursor_index(&self) -> Option<usize> {
        match self.cursor {
            Cursor::Live => self.snapshots.len().checked_sub(1),
            Cursor::At(index) => Some(index),
        }
    }

    /// Snapshot under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&WorldSnapshot> {
        self.snapshots.get(self.cursor_index()?)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&WorldSnapshot> {
        self.snapshots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldSnapshot> + '_ {
        self.snapshots.iter()
    }

    /// Append `snapshot` as the newest entry.
    ///
    /// Any snapshots after a rewound cursor are discarded first, and the oldest
    /// entries are evicted once the buffer exceeds its capacity.
    pub fn record(&mut self, snapshot: WorldSnapshot) {
        if let Cursor::At(index) = self.cursor {
            self.snapshots.truncate(index + 1);
        }
        self.cursor = Cursor::Live;
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
    }

    /// Move the cursor one snapshot back and return that snapshot.
    ///
    /// Returns `None` once the oldest snapshot is under the cursor.
    pub fn step_back(&mut self) -> Option<&WorldSnapshot> {
        let index = self.cursor_index()?.checked_sub(1)?;
        self.cursor = Cursor::At(index);
        self.snapshots.get(index)
    }

    /// Move the cursor back by up to `ticks` snapshots, clamping at the oldest one.
    pub fn jump_back(&mut self, ticks: usize) -> Option<(JumpReport, &WorldSnapshot)> {
        let index = self.cursor_index()?;
        let target = index.saturating_sub(ticks);
        self.cursor = Cursor::At(target);
        let report = JumpReport {
            requested: ticks,
            jumped: index - target,
        };
        Some((report, self.snapshots.get(target)?))
    }

    /// Drop every snapshot and return to live.
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = Cursor::Live;
    }
}
