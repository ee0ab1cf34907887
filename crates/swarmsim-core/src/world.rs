//! The owned simulation object and its tick pipeline.

use rand::{Rng, rngs::SmallRng};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentArena, AgentMode, GroupId, HomeBase};
use crate::base::{BASES, Base, find_base};
use crate::behavior::{BehaviorError, PeerView, StepOutcome, advance_agent};
use crate::collision::resolve_collisions;
use crate::config::{SwarmConfig, WorldStateError};
use crate::group::GroupCoordinator;
use crate::history::{Cursor, HistoryBuffer, JumpReport, WorldSnapshot};
use crate::pattern::{PatternKind, PatternMotion};
use crate::{Position, Tick, Velocity};

const ENEMY_PATTERNS: [PatternKind; 3] = [
    PatternKind::UpDown,
    PatternKind::LeftRight,
    PatternKind::Circular,
];

/// Events emitted by a single call to [`Simulation::step`].
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TickEvents {
    /// Tick the world is at after the call.
    pub tick: Tick,
    /// Motion, groups, collisions and history ran.
    pub simulated: bool,
    /// A snapshot was restored while reversing.
    pub replayed: bool,
    /// Agents removed by collisions, in arena order.
    pub destroyed: Vec<String>,
    /// Groups released into dispersal.
    pub dispersed: Vec<GroupId>,
    /// Agents whose update failed and that held position instead.
    pub failed: Vec<String>,
}

/// Read-only view of the world handed to external readers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorldView {
    pub tick: Tick,
    /// Simulated seconds since reset.
    pub timestamp: f64,
    pub paused: bool,
    pub reversing: bool,
    pub history_len: usize,
    pub cursor: Cursor,
    pub agents: Vec<Agent>,
    pub bases: Vec<Base>,
}

/// Complete swarm world: agents, command groups, history and clock flags.
pub struct Simulation {
    config: SwarmConfig,
    tick: Tick,
    elapsed: f64,
    paused: bool,
    reversing: bool,
    agents: AgentArena,
    groups: GroupCoordinator,
    history: HistoryBuffer,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick)
            .field("elapsed", &self.elapsed)
            .field("paused", &self.paused)
            .field("reversing", &self.reversing)
            .field("agent_count", &self.agents.len())
            .field("groups", &self.groups.len())
            .field("history", &self.history.len())
            .finish()
    }
}

/// Starting population described by `config`.
fn spawn_population(config: &SwarmConfig, rng: &mut SmallRng) -> Vec<Agent> {
    let population = &config.population;
    let (width, height) = (config.world_width, config.world_height);
    let home = find_base(&population.home_base).map(|base| HomeBase {
        id: base.id.to_owned(),
        position: base.position,
    });

    let mut agents = Vec::with_capacity(population.friendly_count + population.enemy_count);
    for idx in 0..population.friendly_count {
        let (row, col) = (idx / population.friendly_columns, idx % population.friendly_columns);
        let position = Position::new(
            population.friendly_origin.x + col as f32 * population.friendly_spacing,
            population.friendly_origin.y + row as f32 * population.friendly_spacing,
        )
        .clamped(width, height);
        let mut agent = Agent::friendly(format!("drone_{}", idx + 1), position);
        agent.home = home.clone();
        agents.push(agent);
    }

    for idx in 0..population.enemy_count {
        let kind = ENEMY_PATTERNS[idx % ENEMY_PATTERNS.len()];
        let extent = match kind {
            PatternKind::Circular => population.enemy_radius,
            PatternKind::UpDown | PatternKind::LeftRight => population.enemy_half_range,
        };
        // Centres fall in the upper half of the world, far enough in that the pattern fits.
        let lo_x = extent.min(width / 2.0);
        let hi_x = (width - extent).max(lo_x);
        let lo_y = extent.min(height / 4.0);
        let hi_y = (height / 2.0).max(lo_y);
        let center = Position::new(rng.random_range(lo_x..=hi_x), rng.random_range(lo_y..=hi_y));
        let pattern = PatternMotion::from_kind(kind, center, extent);
        let start = pattern.anchor().unwrap_or(center).clamped(width, height);
        agents.push(
            Agent::enemy(format!("enemy_{}", idx + 1), start)
                .with_mode(AgentMode::Pattern { pattern }),
        );
    }
    agents
}

impl Simulation {
    /// Validate `config` and build the starting population.
    pub fn new(config: SwarmConfig) -> Result<Self, WorldStateError> {
        let mut sim = Self::empty(config)?;
        sim.reset();
        Ok(sim)
    }

    /// Validate `config` and start from an explicit set of agents.
    ///
    /// Later agents reusing an earlier id are dropped.
    pub fn with_agents(
        config: SwarmConfig,
        agents: impl IntoIterator<Item = Agent>,
    ) -> Result<Self, WorldStateError> {
        let mut sim = Self::empty(config)?;
        sim.agents = AgentArena::from_agents(agents);
        sim.groups = GroupCoordinator::rebuild(&sim.agents, 0);
        sim.stage_history();
        Ok(sim)
    }

    fn empty(config: SwarmConfig) -> Result<Self, WorldStateError> {
        config.validate()?;
        let history = HistoryBuffer::new(config.history_capacity);
        Ok(Self {
            config,
            tick: Tick::zero(),
            elapsed: 0.0,
            paused: false,
            reversing: false,
            agents: AgentArena::new(),
            groups: GroupCoordinator::new(),
            history,
        })
    }

    /// Clear agents, groups and history, then respawn the starting population.
    pub fn reset(&mut self) {
        let mut rng = self.config.seeded_rng();
        let agents = spawn_population(&self.config, &mut rng);
        self.agents = AgentArena::from_agents(agents);
        self.groups.clear();
        self.history.clear();
        self.tick = Tick::zero();
        self.elapsed = 0.0;
        self.paused = false;
        self.reversing = false;
        self.stage_history();
        info!(agents = self.agents.len(), "simulation reset");
    }

    fn stage_motion(&mut self, dt: f32) -> (BTreeSet<GroupId>, Vec<String>) {
        let records = self.agents.records();
        let peers = PeerView::new(records);
        let config = &self.config;
        let results: Vec<Result<StepOutcome, BehaviorError>> = records
            .par_iter()
            .map(|agent| advance_agent(agent, dt, &peers, config))
            .collect();

        let mut next = Vec::with_capacity(records.len());
        let mut signalled = BTreeSet::new();
        let mut failed = Vec::new();
        for (agent, result) in records.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    signalled.extend(outcome.reached_group);
                    next.push(outcome.agent);
                }
                Err(err) => {
                    warn!(%err, "agent update failed; holding position");
                    let mut held = agent.clone();
                    held.velocity = Velocity::zero();
                    failed.push(agent.id.clone());
                    next.push(held);
                }
            }
        }
        self.agents.overwrite(next);
        (signalled, failed)
    }

    fn stage_groups(&mut self, signalled: &BTreeSet<GroupId>) -> Vec<GroupId> {
        self.groups.resolve(&mut self.agents, signalled, &self.config)
    }

    fn stage_collisions(&mut self) -> Vec<String> {
        let destroyed = resolve_collisions(&mut self.agents, self.config.collision_range());
        if !destroyed.is_empty() {
            debug!(tick = %self.tick, ?destroyed, "collisions resolved");
            self.groups.prune(&self.agents);
        }
        destroyed
    }

    fn stage_history(&mut self) {
        self.history.record(self.snapshot());
    }

    /// Advance one tick of nominal length `1 / tick_hz`.
    pub fn step(&mut self) -> TickEvents {
        self.step_with(self.config.tick_dt())
    }

    /// Advance one tick of `dt` seconds, or replay one snapshot while reversing.
    ///
    /// Paused worlds are left untouched. Non-finite or negative `dt` counts as zero.
    pub fn step_with(&mut self, dt: f32) -> TickEvents {
        let mut events = TickEvents {
            tick: self.tick,
            ..TickEvents::default()
        };
        if self.paused {
            return events;
        }
        if self.reversing {
            events.replayed = self.stage_replay();
            events.tick = self.tick;
            return events;
        }

        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let (signalled, failed) = self.stage_motion(dt);
        events.dispersed = self.stage_groups(&signalled);
        events.destroyed = self.stage_collisions();
        events.failed = failed;
        self.tick = self.tick.next();
        self.elapsed += f64::from(dt);
        self.stage_history();

        events.simulated = true;
        events.tick = self.tick;
        events
    }

    fn stage_replay(&mut self) -> bool {
        let Some(snapshot) = self.history.step_back().cloned() else {
            return false;
        };
        self.restore(snapshot);
        true
    }

    fn restore(&mut self, snapshot: WorldSnapshot) {
        self.tick = snapshot.tick;
        self.elapsed = snapshot.timestamp;
        self.agents = AgentArena::from_agents(snapshot.agents);
        self.groups = GroupCoordinator::rebuild(&self.agents, self.groups.next_id());
    }

    /// Stop issuing ticks; all state is preserved.
    pub fn pause(&mut self) {
        if !self.paused {
            info!(tick = %self.tick, "simulation paused");
        }
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            info!(tick = %self.tick, "simulation resumed");
        }
        self.paused = false;
    }

    /// Replay history backwards, one snapshot per tick.
    pub fn reverse(&mut self) {
        if !self.reversing {
            info!(tick = %self.tick, "reversing through history");
        }
        self.reversing = true;
    }

    /// Stop reversing and simulate forward from the current snapshot.
    pub fn forward(&mut self) {
        if self.reversing {
            info!(tick = %self.tick, "resuming forward simulation");
        }
        self.reversing = false;
    }

    /// Rewind up to `ticks` snapshots and continue forward from there.
    pub fn jump_back(&mut self, ticks: usize) -> JumpReport {
        self.reversing = false;
        let Some((report, snapshot)) = self.history.jump_back(ticks) else {
            return JumpReport {
                requested: ticks,
                jumped: 0,
            };
        };
        let snapshot = snapshot.clone();
        self.restore(snapshot);
        info!(
            tick = %self.tick,
            requested = report.requested,
            jumped = report.jumped,
            "jumped back through history"
        );
        report
    }

    /// Deep copy of the current agents.
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            timestamp: self.elapsed,
            agents: self.agents.records().to_vec(),
        }
    }

    /// Query result for external readers.
    #[must_use]
    pub fn view(&self) -> WorldView {
        WorldView {
            tick: self.tick,
            timestamp: self.elapsed,
            paused: self.paused,
            reversing: self.reversing,
            history_len: self.history.len(),
            cursor: self.history.cursor(),
            agents: self.agents.records().to_vec(),
            bases: BASES.to_vec(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Simulated seconds since reset.
    #[must_use]
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub const fn is_reversing(&self) -> bool {
        self.reversing
    }

    /// Read-only access to the agent arena.
    #[must_use]
    pub fn agents(&self) -> &AgentArena {
        &self.agents
    }

    /// Mutable access to the agent arena.
    pub(crate) fn agents_mut(&mut self) -> &mut AgentArena {
        &mut self.agents
    }

    #[must_use]
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    #[must_use]
    pub fn groups(&self) -> &GroupCoordinator {
        &self.groups
    }

    pub(crate) fn groups_mut(&mut self) -> &mut GroupCoordinator {
        &mut self.groups
    }

    #[must_use]
    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Team;

    fn seeded() -> SwarmConfig {
        SwarmConfig {
            rng_seed: Some(7),
            ..SwarmConfig::default()
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = SwarmConfig {
            tick_hz: 0.0,
            ..SwarmConfig::default()
        };
        assert!(Simulation::new(config).is_err());
    }

    #[test]
    fn reset_builds_default_population() {
        let sim = Simulation::new(seeded()).expect("sim");
        let friendlies: Vec<&Agent> = sim.agents().iter().filter(|a| a.team == Team::Friendly).collect();
        assert_eq!(friendlies.len(), 12);
        assert_eq!(friendlies[0].id, "drone_1");
        assert_eq!(friendlies[0].position, Position::new(200.0, 200.0));
        assert_eq!(friendlies[5].position, Position::new(280.0, 280.0));
        assert!(friendlies.iter().all(|a| a.home.as_ref().is_some_and(|h| h.id == "alpha")));

        let enemies: Vec<&Agent> = sim.agents().iter().filter(|a| a.is_enemy()).collect();
        assert_eq!(enemies.len(), 6);
        assert!(enemies.iter().all(|a| a.position.y <= 500.0 + 80.0));
        let kinds: Vec<PatternKind> = enemies
            .iter()
            .filter_map(|a| match &a.mode {
                AgentMode::Pattern { pattern } => Some(pattern.kind()),
                _ => None,
            })
            .collect();
        assert_eq!(&kinds[..3], &ENEMY_PATTERNS);
        assert_eq!(sim.history().len(), 1);
    }

    #[test]
    fn seeded_resets_are_reproducible() {
        let mut sim = Simulation::new(seeded()).expect("sim");
        let initial = sim.snapshot();
        for _ in 0..10 {
            sim.step();
        }
        sim.reset();
        assert_eq!(sim.snapshot(), initial);
        assert_eq!(sim.tick(), Tick::zero());
    }

    #[test]
    fn paused_world_does_not_advance() {
        let mut sim = Simulation::new(seeded()).expect("sim");
        sim.pause();
        let before = sim.snapshot();
        let events = sim.step();
        assert!(!events.simulated);
        assert_eq!(sim.snapshot(), before);
        assert_eq!(sim.history().len(), 1);
    }

    #[test]
    fn reverse_stops_at_oldest_snapshot() {
        let mut sim = Simulation::new(seeded()).expect("sim");
        sim.step();
        sim.reverse();
        assert!(sim.step().replayed);
        assert_eq!(sim.tick(), Tick::zero());
        assert!(!sim.step().replayed);
        assert!(sim.is_reversing());
    }

    #[test]
    fn jump_back_clamps_and_truncates_future() {
        let mut sim = Simulation::new(seeded()).expect("sim");
        for _ in 0..5 {
            sim.step();
        }
        let report = sim.jump_back(10);
        assert_eq!(
            report,
            JumpReport {
                requested: 10,
                jumped: 5
            }
        );
        assert_eq!(sim.tick(), Tick::zero());
        sim.step();
        assert_eq!(sim.history().len(), 2);
        assert!(sim.history().is_live());
    }

    #[test]
    fn failed_agent_holds_position() {
        let bad = Agent::friendly("bad", Position::new(10.0, 10.0)).with_mode(AgentMode::Moving {
            target: Position::new(f32::INFINITY, 10.0),
            group: None,
        });
        let good = Agent::friendly("good", Position::new(100.0, 100.0)).with_mode(AgentMode::Moving {
            target: Position::new(200.0, 100.0),
            group: None,
        });
        let mut sim = Simulation::with_agents(SwarmConfig::default(), [bad, good]).expect("sim");
        let events = sim.step();
        assert_eq!(events.failed, ["bad"]);
        assert_eq!(sim.agent("bad").map(|a| a.position), Some(Position::new(10.0, 10.0)));
        assert!(sim.agent("good").is_some_and(|a| a.position.x > 100.0));
    }

    #[test]
    fn view_reports_clock_state() {
        let mut sim = Simulation::new(seeded()).expect("sim");
        sim.step();
        sim.reverse();
        let view = sim.view();
        assert!(view.reversing);
        assert_eq!(view.history_len, 2);
        assert_eq!(view.cursor, Cursor::Live);
        assert_eq!(view.bases.len(), 3);
        let json = serde_json::to_value(&view).expect("json");
        assert_eq!(json["agents"][0]["id"], "drone_1");
        assert_eq!(json["agents"][0]["mode"], "idle");
    }
}
