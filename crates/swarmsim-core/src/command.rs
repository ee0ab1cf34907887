//! External commands and their application to a [`Simulation`].
//!
//! Every command is validated against the current world before anything is
//! mutated, so a rejected command leaves the simulation untouched.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::Position;
use crate::agent::{Agent, AgentMode, HomeBase, Team};
use crate::base::find_base;
use crate::history::JumpReport;
use crate::pattern::{PatternKind, PatternMotion};
use crate::world::Simulation;

/// Structured command failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("unknown task '{0}'")]
    UnknownTask(String),
}

/// Loose task parameters as they arrive from an external producer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskParams {
    pub agent_ids: Vec<String>,
    pub target_id: Option<String>,
    pub distance: Option<f32>,
    pub waypoints: Vec<Position>,
}

/// A task request whose shape has been checked.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCommand {
    Tail {
        agent_ids: Vec<String>,
        target_id: String,
        distance: Option<f32>,
    },
    Patrol {
        agent_ids: Vec<String>,
        start: Position,
        end: Position,
    },
    Hold {
        agent_ids: Vec<String>,
    },
    ReturnToBase {
        agent_ids: Vec<String>,
    },
    Intercept {
        agent_ids: Vec<String>,
        target_id: String,
    },
}

fn required_target(task: &str, target_id: Option<String>) -> Result<String, CommandError> {
    target_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CommandError::InvalidParameters(format!("{task} requires a target_id")))
}

impl TaskCommand {
    /// Validate the shape of a named task request.
    pub fn from_request(task: &str, params: TaskParams) -> Result<Self, CommandError> {
        let TaskParams {
            agent_ids,
            target_id,
            distance,
            waypoints,
        } = params;
        match task {
            "tail" => {
                if let Some(distance) = distance
                    && !(distance.is_finite() && distance >= 0.0)
                {
                    return Err(CommandError::InvalidParameters(format!(
                        "tail distance must be a non-negative number, got {distance}"
                    )));
                }
                Ok(Self::Tail {
                    agent_ids,
                    target_id: required_target(task, target_id)?,
                    distance,
                })
            }
            "patrol" => match waypoints.as_slice() {
                [start, end] if start.is_finite() && end.is_finite() => Ok(Self::Patrol {
                    agent_ids,
                    start: *start,
                    end: *end,
                }),
                [_, _] => Err(CommandError::InvalidParameters(
                    "patrol waypoints must be finite".into(),
                )),
                other => Err(CommandError::InvalidParameters(format!(
                    "patrol requires exactly 2 waypoints, got {}",
                    other.len()
                ))),
            },
            "hold" => Ok(Self::Hold { agent_ids }),
            "return_to_base" => Ok(Self::ReturnToBase { agent_ids }),
            "intercept" => Ok(Self::Intercept {
                agent_ids,
                target_id: required_target(task, target_id)?,
            }),
            other => Err(CommandError::UnknownTask(other.to_owned())),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tail { .. } => "tail",
            Self::Patrol { .. } => "patrol",
            Self::Hold { .. } => "hold",
            Self::ReturnToBase { .. } => "return_to_base",
            Self::Intercept { .. } => "intercept",
        }
    }

    fn agent_ids(&self) -> &[String] {
        match self {
            Self::Tail { agent_ids, .. }
            | Self::Patrol { agent_ids, .. }
            | Self::Hold { agent_ids }
            | Self::ReturnToBase { agent_ids }
            | Self::Intercept { agent_ids, .. } => agent_ids,
        }
    }
}

/// Commands accepted by the simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Send friendlies to a shared destination as one group.
    Move {
        agent_ids: Vec<String>,
        target: Position,
    },
    /// Run a named task with loosely typed parameters.
    Task {
        task: String,
        #[serde(flatten)]
        params: TaskParams,
    },
    AssignBase {
        agent_ids: Vec<String>,
        base_id: String,
    },
    /// Switch enemies to an autonomous pattern anchored where they are.
    SetPattern {
        agent_ids: Vec<String>,
        pattern: PatternKind,
    },
    Pause,
    Resume,
    Reverse,
    Forward,
    JumpBack {
        #[serde(default)]
        ticks: Option<usize>,
    },
    Reset,
}

/// Successful command result.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// Number of agents whose state changed.
    Updated { count: usize },
    /// Clock flags after a time-control command.
    Clock { paused: bool, reversing: bool },
    Jumped(JumpReport),
    Reset { agents: usize },
}

/// Unique ids in first-seen order.
fn dedup(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Existing agents of `team` among `ids`; unknown ids are skipped and agents of
/// the other team are rejected.
fn select_team(sim: &Simulation, ids: &[String], team: Team) -> Result<Vec<String>, CommandError> {
    let mut selected = Vec::new();
    for id in dedup(ids) {
        let Some(agent) = sim.agents().get(&id) else {
            continue;
        };
        if agent.team != team {
            return Err(CommandError::InvalidParameters(format!(
                "agent '{id}' is not {}",
                match team {
                    Team::Friendly => "friendly",
                    Team::Enemy => "an enemy",
                }
            )));
        }
        selected.push(id);
    }
    Ok(selected)
}

/// Assign the mode produced by `mode_for` to each agent, detaching it from its group.
fn assign_all(
    sim: &mut Simulation,
    ids: &[String],
    mut mode_for: impl FnMut(&Agent) -> Option<AgentMode>,
) -> usize {
    let mut count = 0;
    for id in ids {
        let Some(mode) = sim.agents().get(id).and_then(&mut mode_for) else {
            continue;
        };
        sim.groups_mut().detach(id);
        if let Some(agent) = sim.agents_mut().get_mut(id) {
            agent.assign(mode);
            count += 1;
        }
    }
    count
}

fn apply_move(sim: &mut Simulation, ids: &[String], target: Position) -> Result<usize, CommandError> {
    if !target.is_finite() {
        return Err(CommandError::InvalidParameters(
            "move target must be finite".into(),
        ));
    }
    let config = sim.config();
    let target = target.clamped(config.world_width, config.world_height);
    let members: Vec<String> = dedup(ids)
        .into_iter()
        .filter(|id| sim.agents().get(id).is_some_and(|agent| agent.is_friendly()))
        .collect();
    let group = match members.len() {
        0 => return Ok(0),
        1 => None,
        _ => Some(sim.groups_mut().open(target, members.clone())),
    };
    if group.is_none() {
        for id in &members {
            sim.groups_mut().detach(id);
        }
    }
    for id in &members {
        if let Some(agent) = sim.agents_mut().get_mut(id) {
            agent.assign(AgentMode::Moving { target, group });
        }
    }
    Ok(members.len())
}

fn apply_task(sim: &mut Simulation, task: TaskCommand) -> Result<usize, CommandError> {
    let agents = select_team(sim, task.agent_ids(), Team::Friendly)?;
    match task {
        TaskCommand::Tail {
            target_id, distance, ..
        } => {
            if sim.agents().get(&target_id).is_none() {
                return Err(CommandError::NotFound {
                    kind: "agent",
                    id: target_id,
                });
            }
            if agents.contains(&target_id) {
                return Err(CommandError::InvalidParameters(format!(
                    "agent '{target_id}' cannot tail itself"
                )));
            }
            let distance = distance.unwrap_or(sim.config().tail_distance);
            Ok(assign_all(sim, &agents, |_| {
                Some(AgentMode::Tail {
                    target: target_id.clone(),
                    distance,
                })
            }))
        }
        TaskCommand::Patrol { start, end, .. } => {
            let (width, height) = (sim.config().world_width, sim.config().world_height);
            let (start, end) = (start.clamped(width, height), end.clamped(width, height));
            Ok(assign_all(sim, &agents, |_| {
                Some(AgentMode::Patrol {
                    start,
                    end,
                    heading_to_end: false,
                })
            }))
        }
        TaskCommand::Hold { .. } => Ok(assign_all(sim, &agents, |_| Some(AgentMode::Idle))),
        TaskCommand::ReturnToBase { .. } => Ok(assign_all(sim, &agents, |agent| {
            agent.home.as_ref().map(|home| AgentMode::Moving {
                target: home.position,
                group: None,
            })
        })),
        TaskCommand::Intercept { target_id, .. } => {
            match sim.agents().get(&target_id) {
                None => {
                    return Err(CommandError::NotFound {
                        kind: "agent",
                        id: target_id,
                    });
                }
                Some(target) if !target.is_enemy() => {
                    return Err(CommandError::InvalidParameters(format!(
                        "intercept target '{target_id}' is not an enemy"
                    )));
                }
                Some(_) => {}
            }
            Ok(assign_all(sim, &agents, |agent| {
                Some(AgentMode::Intercept {
                    target: target_id.clone(),
                    origin: agent.position,
                    aim: None,
                })
            }))
        }
    }
}

fn apply_assign_base(sim: &mut Simulation, ids: &[String], base_id: &str) -> Result<usize, CommandError> {
    let base = find_base(base_id).ok_or_else(|| CommandError::NotFound {
        kind: "base",
        id: base_id.to_owned(),
    })?;
    let agents = select_team(sim, ids, Team::Friendly)?;
    for id in &agents {
        if let Some(agent) = sim.agents_mut().get_mut(id) {
            agent.home = Some(HomeBase {
                id: base.id.to_owned(),
                position: base.position,
            });
        }
    }
    Ok(agents.len())
}

fn apply_set_pattern(sim: &mut Simulation, ids: &[String], kind: PatternKind) -> Result<usize, CommandError> {
    let agents = select_team(sim, ids, Team::Enemy)?;
    let population = &sim.config().population;
    let (half_range, radius) = (population.enemy_half_range, population.enemy_radius);
    Ok(assign_all(sim, &agents, |agent| {
        let pattern = match kind {
            PatternKind::Circular => PatternMotion::circular(
                Position::new(agent.position.x - radius, agent.position.y),
                radius,
                0.0,
            ),
            oscillating => PatternMotion::from_kind(oscillating, agent.position, half_range),
        };
        Some(AgentMode::Pattern { pattern })
    }))
}

/// Apply `command` to `sim`, returning a structured outcome.
pub fn apply_control_command(
    sim: &mut Simulation,
    command: ControlCommand,
) -> Result<CommandOutcome, CommandError> {
    let clock = |sim: &Simulation| CommandOutcome::Clock {
        paused: sim.is_paused(),
        reversing: sim.is_reversing(),
    };
    let outcome = match command {
        ControlCommand::Move { agent_ids, target } => CommandOutcome::Updated {
            count: apply_move(sim, &agent_ids, target)?,
        },
        ControlCommand::Task { task, params } => {
            let task = TaskCommand::from_request(&task, params)?;
            let name = task.name();
            let count = apply_task(sim, task)?;
            debug!(task = name, count, "task applied");
            CommandOutcome::Updated { count }
        }
        ControlCommand::AssignBase { agent_ids, base_id } => CommandOutcome::Updated {
            count: apply_assign_base(sim, &agent_ids, &base_id)?,
        },
        ControlCommand::SetPattern { agent_ids, pattern } => CommandOutcome::Updated {
            count: apply_set_pattern(sim, &agent_ids, pattern)?,
        },
        ControlCommand::Pause => {
            sim.pause();
            clock(sim)
        }
        ControlCommand::Resume => {
            sim.resume();
            clock(sim)
        }
        ControlCommand::Reverse => {
            sim.reverse();
            clock(sim)
        }
        ControlCommand::Forward => {
            sim.forward();
            clock(sim)
        }
        ControlCommand::JumpBack { ticks } => {
            let ticks = ticks.unwrap_or(sim.config().jump_back_ticks);
            CommandOutcome::Jumped(sim.jump_back(ticks))
        }
        ControlCommand::Reset => {
            sim.reset();
            CommandOutcome::Reset {
                agents: sim.agents().len(),
            }
        }
    };
    debug!(?outcome, "control command applied");
    Ok(outcome)
}
