//! Per-agent state machine.
//!
//! [`advance_agent`] maps one agent plus a read-only [`PeerView`] of the pre-tick
//! world to that agent's next record. It never touches other agents; group
//! arrival is reported through [`StepOutcome::reached_group`] and settled by the
//! group coordinator after every agent has moved.

use std::collections::HashMap;
use thiserror::Error;

use crate::agent::{Agent, AgentMode, GroupId, Team};
use crate::config::SwarmConfig;
use crate::intercept::{InterceptParams, TargetTrajectory, predict_intercept};
use crate::{Position, Velocity};

/// Failure confined to a single agent's update.
#[derive(Debug, Error, PartialEq)]
pub enum BehaviorError {
    #[error("agent {id} produced non-finite kinematics in mode {mode}")]
    NonFinite { id: String, mode: &'static str },
}

/// Immutable lookup over the agents as they were at the start of the tick.
#[derive(Debug)]
pub struct PeerView<'a> {
    agents: &'a [Agent],
    index: HashMap<&'a str, usize>,
}

impl<'a> PeerView<'a> {
    #[must_use]
    pub fn new(agents: &'a [Agent]) -> Self {
        let index = agents
            .iter()
            .enumerate()
            .map(|(idx, agent)| (agent.id.as_str(), idx))
            .collect();
        Self { agents, index }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&'a Agent> {
        self.index.get(id).map(|&idx| &self.agents[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Agent> + '_ {
        self.agents.iter()
    }
}

/// Next record for one agent plus any group arrival it signalled.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub agent: Agent,
    pub reached_group: Option<GroupId>,
}

/// Result of steering towards a point for one tick.
#[derive(Debug, Clone, Copy)]
struct Steer {
    position: Position,
    velocity: Velocity,
    arrived: bool,
}

/// Steer straight at `target`. Snaps onto the target instead of overshooting.
fn steer(position: Position, target: Position, speed: f32, dt: f32, epsilon: f32) -> Steer {
    let (direction, distance) = position.direction_to(target);
    if distance < epsilon || speed * dt >= distance {
        return Steer {
            position: target,
            velocity: Velocity::zero(),
            arrived: true,
        };
    }
    let velocity = Velocity::along(direction, speed);
    Steer {
        position: position.integrate(velocity, dt),
        velocity,
        arrived: false,
    }
}

fn team_speed(team: Team, config: &SwarmConfig) -> f32 {
    match team {
        Team::Friendly => config.friendly_speed,
        Team::Enemy => config.enemy_speed,
    }
}

/// Speed multiplier for a friendly whose path is blocked by another friendly.
fn avoidance_factor(agent: &Agent, target: Position, peers: &PeerView<'_>, config: &SwarmConfig) -> f32 {
    let throttle = config.avoidance;
    if !throttle.enabled || !agent.is_friendly() {
        return 1.0;
    }
    let ((hx, hy), _) = agent.position.direction_to(target);
    let blocked = peers.iter().any(|peer| {
        if peer.id == agent.id || !peer.is_friendly() {
            return false;
        }
        let dx = peer.position.x - agent.position.x;
        let dy = peer.position.y - agent.position.y;
        let distance = dx.hypot(dy);
        distance > 0.0 && distance < throttle.radius && dx * hx + dy * hy > 0.0
    });
    if blocked { throttle.factor } else { 1.0 }
}

/// Record this tick's displacement; returns true once the agent counts as stuck.
fn track_stuck(next: &mut Agent, config: &SwarmConfig) -> bool {
    if !config.stuck.enabled {
        return false;
    }
    let moved = next.position.distance(next.stuck.last_position);
    if moved < config.stuck.movement_threshold {
        next.stuck.frames = next.stuck.frames.saturating_add(1);
    } else {
        next.stuck.frames = 0;
    }
    next.stuck.last_position = next.position;
    next.stuck.frames >= config.stuck.frames
}

/// Whether the stuck-arrival rule has fired for `agent`.
#[must_use]
pub fn stuck_expired(agent: &Agent, config: &SwarmConfig) -> bool {
    config.stuck.enabled && agent.stuck.frames >= config.stuck.frames
}

fn step_moving(
    agent: &Agent,
    next: &mut Agent,
    target: Position,
    group: Option<GroupId>,
    dt: f32,
    peers: &PeerView<'_>,
    config: &SwarmConfig,
) -> Option<GroupId> {
    // A jammed group member holds where it is until the group is released.
    if let Some(group) = group
        && stuck_expired(agent, config)
    {
        next.velocity = Velocity::zero();
        return Some(group);
    }

    let speed = team_speed(agent.team, config) * avoidance_factor(agent, target, peers, config);
    let steer = steer(agent.position, target, speed, dt, config.arrival_epsilon);
    next.position = steer.position;
    next.velocity = steer.velocity;
    let stuck = !steer.arrived && track_stuck(next, config);
    if !(steer.arrived || stuck) {
        return None;
    }
    match group {
        Some(group) => {
            next.velocity = Velocity::zero();
            Some(group)
        }
        None => {
            next.assign(AgentMode::Idle);
            None
        }
    }
}

fn step_dispersing(agent: &Agent, next: &mut Agent, target: Position, dt: f32, config: &SwarmConfig) {
    let speed = team_speed(agent.team, config);
    let (direction, distance) = agent.position.direction_to(target);
    if distance < config.dispersion_epsilon || speed * dt >= distance {
        next.position = target;
        next.assign(AgentMode::Idle);
        return;
    }
    let braking_radius = speed * dt * config.braking_factor;
    let effective = if distance < braking_radius {
        speed * distance / braking_radius
    } else {
        speed
    };
    next.velocity = Velocity::along(direction, effective);
    next.position = agent.position.integrate(next.velocity, dt);
    if track_stuck(next, config) {
        next.assign(AgentMode::Idle);
    }
}

fn step_patrol(
    agent: &Agent,
    next: &mut Agent,
    (start, end, heading_to_end): (Position, Position, bool),
    dt: f32,
    config: &SwarmConfig,
) {
    let mut heading_to_end = heading_to_end;
    let mut destination = if heading_to_end { end } else { start };
    if agent.position.distance(destination) < config.arrival_epsilon {
        heading_to_end = !heading_to_end;
        destination = if heading_to_end { end } else { start };
    }
    let steer = steer(
        agent.position,
        destination,
        team_speed(agent.team, config),
        dt,
        config.arrival_epsilon,
    );
    next.position = steer.position;
    next.velocity = steer.velocity;
    next.mode = AgentMode::Patrol {
        start,
        end,
        heading_to_end,
    };
}

fn step_tail(
    agent: &Agent,
    next: &mut Agent,
    target: &str,
    standoff: f32,
    dt: f32,
    peers: &PeerView<'_>,
    config: &SwarmConfig,
) {
    let Some(followed) = peers.get(target) else {
        next.assign(AgentMode::Idle);
        return;
    };
    let (mut direction, distance) = agent.position.direction_to(followed.position);
    let error = distance - standoff;
    if error.abs() <= config.tail_dead_band {
        next.velocity = Velocity::zero();
        return;
    }
    if direction == (0.0, 0.0) {
        // Stacked on the target: the retreat heads along +x.
        direction = (-1.0, 0.0);
    }
    let sign = error.signum();
    let travel = (team_speed(agent.team, config) * dt).min(error.abs());
    let heading = (direction.0 * sign, direction.1 * sign);
    next.velocity = Velocity::along(heading, travel / dt);
    next.position = agent.position.integrate(next.velocity, dt);
}

#[allow(clippy::too_many_arguments)]
fn step_intercept(
    agent: &Agent,
    next: &mut Agent,
    target: &str,
    origin: Position,
    aim: Option<Position>,
    dt: f32,
    peers: &PeerView<'_>,
    config: &SwarmConfig,
) {
    let returning = AgentMode::Moving {
        target: origin,
        group: None,
    };
    let Some(enemy) = peers.get(target) else {
        next.assign(returning);
        return;
    };

    let range = config.collision_range();
    let resolved = agent.position.distance(enemy.position) < range
        || peers.iter().any(|peer| {
            peer.id != agent.id
                && peer.is_friendly()
                && matches!(&peer.mode, AgentMode::Intercept { target: other, .. } if other == target)
                && peer.position.distance(enemy.position) < range
        });
    if resolved {
        next.assign(returning);
        return;
    }

    let speed = team_speed(agent.team, config);
    let solution = predict_intercept(
        agent.position,
        speed,
        TargetTrajectory::of(enemy, config),
        InterceptParams::from(config),
    );
    let aim = match aim {
        Some(previous) if previous.distance(solution.aim) <= config.aim_tolerance => previous,
        _ => solution.aim,
    };
    let steer = steer(agent.position, aim, speed, dt, 0.0);
    next.position = steer.position;
    next.velocity = steer.velocity;
    next.mode = AgentMode::Intercept {
        target: target.to_owned(),
        origin,
        aim: Some(aim),
    };
}

/// Advance `agent` by `dt` seconds against the pre-tick `peers`.
pub fn advance_agent(
    agent: &Agent,
    dt: f32,
    peers: &PeerView<'_>,
    config: &SwarmConfig,
) -> Result<StepOutcome, BehaviorError> {
    let mut next = agent.clone();
    let mut reached_group = None;

    match &agent.mode {
        AgentMode::Idle => next.velocity = Velocity::zero(),
        AgentMode::Moving { target, group } => {
            reached_group = step_moving(agent, &mut next, *target, *group, dt, peers, config);
        }
        AgentMode::Dispersing { target, .. } => {
            step_dispersing(agent, &mut next, *target, dt, config);
        }
        AgentMode::Pattern { pattern } => {
            let mut pattern = *pattern;
            let (position, velocity) =
                pattern.advance(agent.position, config.enemy_speed, dt, config.bounds());
            next.position = position;
            next.velocity = velocity;
            next.mode = AgentMode::Pattern { pattern };
        }
        AgentMode::Patrol {
            start,
            end,
            heading_to_end,
        } => step_patrol(agent, &mut next, (*start, *end, *heading_to_end), dt, config),
        AgentMode::Tail { target, distance } => {
            step_tail(agent, &mut next, target, *distance, dt, peers, config);
        }
        AgentMode::Intercept {
            target,
            origin,
            aim,
        } => step_intercept(agent, &mut next, target, *origin, *aim, dt, peers, config),
    }

    next.position = next.position.clamped(config.world_width, config.world_height);
    if !(next.position.is_finite() && next.velocity.is_finite()) {
        return Err(BehaviorError::NonFinite {
            id: agent.id.clone(),
            mode: agent.mode.name(),
        });
    }
    Ok(StepOutcome {
        agent: next,
        reached_group,
    })
}
