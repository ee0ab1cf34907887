//! Agent records and the arena that stores them.

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::pattern::PatternMotion;
use crate::{Position, Velocity};

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentKey;
}

/// Side an agent fights for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Friendly,
    Enemy,
}

impl Team {
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Friendly => Self::Enemy,
            Self::Enemy => Self::Friendly,
        }
    }
}

/// Identifier of a command group; allocated monotonically.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

/// Base an agent returns to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HomeBase {
    pub id: String,
    pub position: Position,
}

/// Progress tracking for the stuck-arrival rule.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StuckTracker {
    pub last_position: Position,
    pub frames: u32,
}

impl StuckTracker {
    /// Tracker primed at `position` with no stuck ticks recorded.
    #[must_use]
    pub const fn at(position: Position) -> Self {
        Self {
            last_position: position,
            frames: 0,
        }
    }
}

/// Exclusive behaviour an agent is executing, carrying only that behaviour's payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AgentMode {
    #[default]
    Idle,
    Moving {
        target: Position,
        group: Option<GroupId>,
    },
    Dispersing {
        target: Position,
        group: Option<GroupId>,
    },
    Pattern {
        pattern: PatternMotion,
    },
    Patrol {
        start: Position,
        end: Position,
        heading_to_end: bool,
    },
    Tail {
        target: String,
        distance: f32,
    },
    Intercept {
        target: String,
        /// Where the agent was when the intercept began.
        origin: Position,
        /// Last committed aim point.
        aim: Option<Position>,
    },
}

impl AgentMode {
    /// Short lowercase name of the mode.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Moving { .. } => "moving",
            Self::Dispersing { .. } => "dispersing",
            Self::Pattern { .. } => "pattern",
            Self::Patrol { .. } => "patrol",
            Self::Tail { .. } => "tail",
            Self::Intercept { .. } => "intercept",
        }
    }

    /// Command group the mode belongs to, if any.
    #[must_use]
    pub const fn group(&self) -> Option<GroupId> {
        match self {
            Self::Moving { group, .. } | Self::Dispersing { group, .. } => *group,
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Authoritative per-entity state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    pub team: Team,
    pub position: Position,
    pub velocity: Velocity,
    #[serde(flatten)]
    pub mode: AgentMode,
    pub home: Option<HomeBase>,
    pub stuck: StuckTracker,
}

impl Agent {
    /// Idle friendly at `position`.
    #[must_use]
    pub fn friendly(id: impl Into<String>, position: Position) -> Self {
        Self::new(id, Team::Friendly, position)
    }

    /// Enemy at `position`, idle until a pattern is assigned.
    #[must_use]
    pub fn enemy(id: impl Into<String>, position: Position) -> Self {
        Self::new(id, Team::Enemy, position)
    }

    fn new(id: impl Into<String>, team: Team, position: Position) -> Self {
        Self {
            id: id.into(),
            team,
            position,
            velocity: Velocity::zero(),
            mode: AgentMode::Idle,
            home: None,
            stuck: StuckTracker::at(position),
        }
    }

    /// Builder-style mode assignment.
    #[must_use]
    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder-style home base assignment.
    #[must_use]
    pub fn with_home(mut self, home: HomeBase) -> Self {
        self.home = Some(home);
        self
    }

    #[must_use]
    pub fn is_friendly(&self) -> bool {
        self.team == Team::Friendly
    }

    #[must_use]
    pub fn is_enemy(&self) -> bool {
        self.team == Team::Enemy
    }

    /// Command group the agent currently belongs to.
    #[must_use]
    pub fn group(&self) -> Option<GroupId> {
        self.mode.group()
    }

    /// Replace the mode, zeroing velocity and resetting stuck tracking.
    pub fn assign(&mut self, mode: AgentMode) {
        self.mode = mode;
        self.velocity = Velocity::zero();
        self.stuck = StuckTracker::at(self.position);
    }
}

/// Dense agent storage with generational handles and a name index.
///
/// Iteration order is insertion order and survives removals.
#[derive(Debug, Clone, Default)]
pub struct AgentArena {
    slots: SlotMap<AgentKey, usize>,
    handles: Vec<AgentKey>,
    records: Vec<Agent>,
    names: HashMap<String, AgentKey>,
}

impl AgentArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an arena from records in iteration order; later duplicates of an id are dropped.
    #[must_use]
    pub fn from_agents(agents: impl IntoIterator<Item = Agent>) -> Self {
        let mut arena = Self::new();
        for agent in agents {
            arena.insert(agent);
        }
        arena
    }

    /// Number of live agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when no agents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert `agent`, returning its handle, or `None` if the id is already taken.
    pub fn insert(&mut self, agent: Agent) -> Option<AgentKey> {
        if self.names.contains_key(&agent.id) {
            return None;
        }
        let index = self.records.len();
        let key = self.slots.insert(index);
        self.names.insert(agent.id.clone(), key);
        self.records.push(agent);
        self.handles.push(key);
        Some(key)
    }

    /// Handle for the agent named `id`.
    #[must_use]
    pub fn key_of(&self, id: &str) -> Option<AgentKey> {
        self.names.get(id).copied()
    }

    /// Dense index for `key`, if present.
    #[must_use]
    pub fn index_of(&self, key: AgentKey) -> Option<usize> {
        self.slots.get(key).copied()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.names.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Agent> {
        let index = self.index_of(self.key_of(id)?)?;
        self.records.get(index)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Agent> {
        let index = self.index_of(self.key_of(id)?)?;
        self.records.get_mut(index)
    }

    /// Agents in iteration order.
    #[must_use]
    pub fn records(&self) -> &[Agent] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Agent> + '_ {
        self.records.iter_mut()
    }

    /// Replace every record with `next`, which must be the same agents in the same order.
    pub(crate) fn overwrite(&mut self, next: Vec<Agent>) {
        debug_assert_eq!(next.len(), self.records.len());
        debug_assert!(
            next.iter()
                .zip(&self.records)
                .all(|(a, b)| a.id == b.id)
        );
        self.records = next;
    }

    /// Remove every agent whose id is in `dead`, preserving iteration order.
    pub fn remove_many(&mut self, dead: &HashSet<String>) -> usize {
        if dead.is_empty() {
            return 0;
        }
        let before = self.records.len();
        let mut write = 0;
        for read in 0..before {
            let key = self.handles[read];
            if dead.contains(&self.records[read].id) {
                self.slots.remove(key);
                self.names.remove(&self.records[read].id);
                continue;
            }
            if write != read {
                self.handles.swap(write, read);
                self.records.swap(write, read);
            }
            if let Some(slot) = self.slots.get_mut(key) {
                *slot = write;
            }
            write += 1;
        }
        self.handles.truncate(write);
        self.records.truncate(write);
        before - write
    }

    /// Remove a single agent by id.
    pub fn remove(&mut self, id: &str) -> Option<Agent> {
        let key = self.names.remove(id)?;
        let index = self.slots.remove(key)?;
        let removed_handle = self.handles.remove(index);
        debug_assert_eq!(removed_handle, key);
        let removed = self.records.remove(index);
        for (offset, handle) in self.handles[index..].iter().enumerate() {
            if let Some(slot) = self.slots.get_mut(*handle) {
                *slot = index + offset;
            }
        }
        Some(removed)
    }

    /// Clear all stored agents.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.handles.clear();
        self.records.clear();
        self.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, x: f32) -> Agent {
        Agent::friendly(id, Position::new(x, x + 1.0))
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let mut arena = AgentArena::new();
        assert!(arena.insert(sample("a", 0.0)).is_some());
        assert!(arena.insert(sample("a", 5.0)).is_none());
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get("a").map(|a| a.position.x), Some(0.0));
    }

    #[test]
    fn remove_many_keeps_order_and_lookup_coherent() {
        let mut arena = AgentArena::from_agents(
            ["a", "b", "c", "d"]
                .iter()
                .enumerate()
                .map(|(i, id)| sample(id, i as f32)),
        );
        let dead: HashSet<String> = ["b".to_owned(), "d".to_owned()].into();
        assert_eq!(arena.remove_many(&dead), 2);

        let ids: Vec<&str> = arena.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert!(!arena.contains("b"));
        assert_eq!(arena.get("c").map(|a| a.position.x), Some(2.0));
        let key = arena.key_of("c").expect("key");
        assert_eq!(arena.index_of(key), Some(1));
    }

    #[test]
    fn single_remove_reindexes_tail() {
        let mut arena = AgentArena::from_agents([sample("a", 0.0), sample("b", 1.0), sample("c", 2.0)]);
        let removed = arena.remove("a").expect("removed");
        assert_eq!(removed.id, "a");
        assert_eq!(arena.get("b").map(|a| a.position.x), Some(1.0));
        assert_eq!(arena.get("c").map(|a| a.position.x), Some(2.0));
        assert!(arena.remove("a").is_none());
    }

    #[test]
    fn handles_are_not_reused_after_removal() {
        let mut arena = AgentArena::new();
        let a = arena.insert(sample("a", 0.0)).expect("a");
        arena.remove("a");
        let b = arena.insert(sample("a", 0.0)).expect("reinserted");
        assert_ne!(a, b, "generational handles should not be reused immediately");
    }

    #[test]
    fn assign_resets_motion_state() {
        let mut agent = sample("a", 3.0);
        agent.velocity = Velocity::new(4.0, 4.0);
        agent.stuck.frames = 9;
        agent.assign(AgentMode::Moving {
            target: Position::new(10.0, 10.0),
            group: Some(GroupId(2)),
        });
        assert_eq!(agent.velocity, Velocity::zero());
        assert_eq!(agent.stuck, StuckTracker::at(agent.position));
        assert_eq!(agent.group(), Some(GroupId(2)));
        assert_eq!(agent.mode.name(), "moving");
    }
}
