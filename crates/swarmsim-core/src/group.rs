//! Command-group bookkeeping and synchronized dispersal.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::agent::{AgentArena, AgentMode, GroupId};
use crate::behavior::stuck_expired;
use crate::config::SwarmConfig;
use crate::Position;

/// Friendlies sharing one destination, in command order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandGroup {
    pub destination: Position,
    pub members: Vec<String>,
}

/// Index from group id to members, plus the monotonically increasing id counter.
#[derive(Debug, Clone, Default)]
pub struct GroupCoordinator {
    next_id: u64,
    groups: BTreeMap<GroupId, CommandGroup>,
}

/// Roughly square grid of `count` cells centred on `center`, clamped into the world.
///
/// Cells are filled row by row; the grid has `⌈√count⌉` columns.
#[must_use]
pub fn dispersion_grid(center: Position, count: usize, spacing: f32, bounds: (f32, f32)) -> Vec<Position> {
    if count == 0 {
        return Vec::new();
    }
    let columns = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(columns);
    let x0 = center.x - (columns - 1) as f32 * spacing / 2.0;
    let y0 = center.y - (rows - 1) as f32 * spacing / 2.0;
    (0..count)
        .map(|idx| {
            let (row, col) = (idx / columns, idx % columns);
            Position::new(x0 + col as f32 * spacing, y0 + row as f32 * spacing)
                .clamped(bounds.0, bounds.1)
        })
        .collect()
}

impl GroupCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from agent modes, e.g. after restoring a snapshot.
    ///
    /// Only agents still `moving` under a group are indexed; the id counter resumes
    /// past every group id visible in the arena.
    #[must_use]
    pub fn rebuild(arena: &AgentArena, floor: u64) -> Self {
        let mut coordinator = Self {
            next_id: floor,
            groups: BTreeMap::new(),
        };
        for agent in arena.iter() {
            if let Some(group) = agent.group() {
                coordinator.next_id = coordinator.next_id.max(group.0 + 1);
            }
            if let AgentMode::Moving {
                target,
                group: Some(group),
            } = &agent.mode
            {
                coordinator
                    .groups
                    .entry(*group)
                    .or_insert_with(|| CommandGroup {
                        destination: *target,
                        members: Vec::new(),
                    })
                    .members
                    .push(agent.id.clone());
            }
        }
        coordinator
    }

    /// Number of open groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Id the next group will receive.
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    #[must_use]
    pub fn get(&self, id: GroupId) -> Option<&CommandGroup> {
        self.groups.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (GroupId, &CommandGroup)> + '_ {
        self.groups.iter().map(|(id, group)| (*id, group))
    }

    /// Open a new group for `members`, detaching them from any earlier group.
    pub fn open(&mut self, destination: Position, members: Vec<String>) -> GroupId {
        for member in &members {
            self.detach(member);
        }
        let id = GroupId(self.next_id);
        self.next_id += 1;
        self.groups.insert(
            id,
            CommandGroup {
                destination,
                members,
            },
        );
        id
    }

    /// Remove `agent_id` from whichever group holds it, dropping emptied groups.
    pub fn detach(&mut self, agent_id: &str) {
        self.groups.retain(|_, group| {
            group.members.retain(|member| member != agent_id);
            !group.members.is_empty()
        });
    }

    /// Drop members that are gone or no longer moving under their group.
    pub fn prune(&mut self, arena: &AgentArena) {
        self.groups.retain(|id, group| {
            group.members.retain(|member| {
                arena.get(member).is_some_and(|agent| {
                    matches!(agent.mode, AgentMode::Moving { group: Some(g), .. } if g == *id)
                })
            });
            !group.members.is_empty()
        });
    }

    /// Release every group in `signalled` whose members have all arrived.
    ///
    /// Released members switch to `dispersing` towards their grid cell, assigned in
    /// command order, and the group is closed. Returns the released group ids.
    pub fn resolve(
        &mut self,
        arena: &mut AgentArena,
        signalled: &BTreeSet<GroupId>,
        config: &SwarmConfig,
    ) -> Vec<GroupId> {
        self.prune(arena);
        let mut released = Vec::new();
        for id in signalled {
            let Some(group) = self.groups.get(id) else {
                continue;
            };
            let all_arrived = group.members.iter().all(|member| {
                arena.get(member).is_some_and(|agent| {
                    agent.position.distance(group.destination) < config.arrival_epsilon
                        || stuck_expired(agent, config)
                })
            });
            if !all_arrived {
                continue;
            }
            let Some(group) = self.groups.remove(id) else {
                continue;
            };
            let cells = dispersion_grid(
                group.destination,
                group.members.len(),
                config.dispersion_spacing,
                (config.world_width, config.world_height),
            );
            for (member, cell) in group.members.iter().zip(cells) {
                if let Some(agent) = arena.get_mut(member) {
                    agent.assign(AgentMode::Dispersing {
                        target: cell,
                        group: Some(*id),
                    });
                }
            }
            debug!(group = %id, members = group.members.len(), "group arrived, dispersing");
            released.push(*id);
        }
        released
    }

    /// Forget every group and restart ids from zero.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.next_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;

    fn bounds() -> (f32, f32) {
        (1_000.0, 1_000.0)
    }

    #[test]
    fn grid_is_centred_and_square() {
        let cells = dispersion_grid(Position::new(500.0, 500.0), 4, 40.0, bounds());
        assert_eq!(
            cells,
            vec![
                Position::new(480.0, 480.0),
                Position::new(520.0, 480.0),
                Position::new(480.0, 520.0),
                Position::new(520.0, 520.0),
            ]
        );
    }

    #[test]
    fn grid_handles_ragged_last_row() {
        let cells = dispersion_grid(Position::new(500.0, 500.0), 5, 10.0, bounds());
        // 3 columns, 2 rows.
        assert_eq!(cells.len(), 5);
        assert_eq!(cells[0], Position::new(490.0, 495.0));
        assert_eq!(cells[4], Position::new(500.0, 505.0));
        let single = dispersion_grid(Position::new(1.0, 2.0), 1, 10.0, bounds());
        assert_eq!(single, vec![Position::new(1.0, 2.0)]);
    }

    #[test]
    fn grid_cells_are_clamped() {
        let cells = dispersion_grid(Position::new(0.0, 1_000.0), 4, 40.0, bounds());
        assert!(cells.iter().all(|c| c.x >= 0.0 && c.y <= 1_000.0));
    }

    #[test]
    fn ids_increase_and_reassignment_detaches() {
        let mut coordinator = GroupCoordinator::new();
        let first = coordinator.open(Position::new(1.0, 1.0), vec!["a".into(), "b".into()]);
        let second = coordinator.open(Position::new(2.0, 2.0), vec!["a".into()]);
        assert!(second > first);
        assert_eq!(
            coordinator.get(first).map(|g| g.members.clone()),
            Some(vec!["b".to_owned()])
        );
        coordinator.detach("b");
        assert!(coordinator.get(first).is_none());
        assert_eq!(coordinator.len(), 1);
    }

    #[test]
    fn resolve_waits_for_every_moving_member() {
        let config = SwarmConfig::default();
        let destination = Position::new(500.0, 500.0);
        let mut coordinator = GroupCoordinator::new();
        let id = coordinator.open(destination, vec!["a".into(), "b".into()]);
        let mode = AgentMode::Moving {
            target: destination,
            group: Some(id),
        };
        let mut arena = AgentArena::from_agents([
            Agent::friendly("a", destination).with_mode(mode.clone()),
            Agent::friendly("b", Position::new(400.0, 500.0)).with_mode(mode),
        ]);
        let signalled = BTreeSet::from([id]);

        assert!(coordinator.resolve(&mut arena, &signalled, &config).is_empty());

        // Once the straggler is gone it no longer blocks the group.
        arena.remove("b");
        assert_eq!(coordinator.resolve(&mut arena, &signalled, &config), vec![id]);
        assert!(coordinator.is_empty());
        assert_eq!(
            arena.get("a").map(|a| a.mode.clone()),
            Some(AgentMode::Dispersing {
                target: destination,
                group: Some(id),
            })
        );
    }

    #[test]
    fn rebuild_recovers_moving_groups() {
        let target = Position::new(10.0, 10.0);
        let arena = AgentArena::from_agents([
            Agent::friendly("a", Position::new(0.0, 0.0)).with_mode(AgentMode::Moving {
                target,
                group: Some(GroupId(3)),
            }),
            Agent::friendly("b", Position::new(0.0, 0.0)).with_mode(AgentMode::Dispersing {
                target,
                group: Some(GroupId(5)),
            }),
        ]);
        let coordinator = GroupCoordinator::rebuild(&arena, 1);
        assert_eq!(coordinator.len(), 1);
        assert_eq!(
            coordinator.get(GroupId(3)).map(|g| g.members.clone()),
            Some(vec!["a".to_owned()])
        );
        assert_eq!(coordinator.next_id(), 6);
    }
}
