//! Friendly/enemy contact detection and removal.

use std::collections::HashSet;

use crate::agent::AgentArena;

/// Remove every friendly/enemy pair closer than `range`.
///
/// Pairs are scanned in arena order; an agent marked once is skipped for the rest
/// of the pass, and all marked agents are removed together at the end. Returns the
/// destroyed ids in arena order.
pub fn resolve_collisions(arena: &mut AgentArena, range: f32) -> Vec<String> {
    let records = arena.records();
    let mut marked = vec![false; records.len()];
    for (fi, friendly) in records.iter().enumerate() {
        if !friendly.is_friendly() {
            continue;
        }
        for (ei, enemy) in records.iter().enumerate() {
            if marked[ei] || !enemy.is_enemy() {
                continue;
            }
            if friendly.position.distance(enemy.position) < range {
                marked[fi] = true;
                marked[ei] = true;
                break;
            }
        }
    }

    let destroyed: Vec<String> = records
        .iter()
        .zip(&marked)
        .filter(|(_, hit)| **hit)
        .map(|(agent, _)| agent.id.clone())
        .collect();
    if !destroyed.is_empty() {
        let dead: HashSet<String> = destroyed.iter().cloned().collect();
        arena.remove_many(&dead);
    }
    destroyed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;
    use crate::agent::Agent;

    #[test]
    fn overlapping_pair_is_removed_together() {
        let mut arena = AgentArena::from_agents([
            Agent::friendly("f1", Position::new(100.0, 100.0)),
            Agent::enemy("e1", Position::new(110.0, 100.0)),
            Agent::friendly("f2", Position::new(500.0, 500.0)),
        ]);
        let destroyed = resolve_collisions(&mut arena, 20.0);
        assert_eq!(destroyed, ["f1", "e1"]);
        assert_eq!(arena.len(), 1);
        assert!(arena.contains("f2"));
    }

    #[test]
    fn each_enemy_absorbs_one_friendly() {
        let mut arena = AgentArena::from_agents([
            Agent::friendly("f1", Position::new(100.0, 100.0)),
            Agent::friendly("f2", Position::new(101.0, 100.0)),
            Agent::enemy("e1", Position::new(105.0, 100.0)),
        ]);
        let destroyed = resolve_collisions(&mut arena, 20.0);
        assert_eq!(destroyed, ["f1", "e1"]);
        assert!(arena.contains("f2"));
    }

    #[test]
    fn same_team_contacts_are_ignored() {
        let mut arena = AgentArena::from_agents([
            Agent::friendly("f1", Position::new(0.0, 0.0)),
            Agent::friendly("f2", Position::new(0.0, 0.0)),
            Agent::enemy("e1", Position::new(50.0, 0.0)),
            Agent::enemy("e2", Position::new(50.0, 0.0)),
        ]);
        assert!(resolve_collisions(&mut arena, 20.0).is_empty());
        assert_eq!(arena.len(), 4);
    }

    #[test]
    fn exact_range_is_not_a_hit() {
        let mut arena = AgentArena::from_agents([
            Agent::friendly("f", Position::new(0.0, 0.0)),
            Agent::enemy("e", Position::new(20.0, 0.0)),
        ]);
        assert!(resolve_collisions(&mut arena, 20.0).is_empty());
    }
}
