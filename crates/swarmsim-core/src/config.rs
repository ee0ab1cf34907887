//! Static configuration for a swarm world.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Position;
use crate::base::find_base;

/// Errors that can occur when constructing world state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldStateError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Stuck-arrival rule for moving agents that stop making progress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StuckDetection {
    /// Whether the rule runs at all.
    pub enabled: bool,
    /// Per-tick displacement below which a tick counts as stuck.
    pub movement_threshold: f32,
    /// Consecutive stuck ticks after which the agent is treated as arrived.
    pub frames: u32,
}

impl Default for StuckDetection {
    fn default() -> Self {
        Self {
            enabled: false,
            movement_threshold: 0.1,
            frames: 25,
        }
    }
}

/// Speed throttle applied to a moving friendly when another friendly blocks its path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AvoidanceThrottle {
    pub enabled: bool,
    /// Look-ahead radius in world units.
    pub radius: f32,
    /// Multiplier applied to speed while blocked, in `[0, 1]`.
    pub factor: f32,
}

impl Default for AvoidanceThrottle {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 20.0,
            factor: 0.25,
        }
    }
}

/// Starting population created on reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PopulationConfig {
    pub friendly_count: usize,
    /// Columns of the initial friendly grid.
    pub friendly_columns: usize,
    pub friendly_spacing: f32,
    /// Top-left cell of the initial friendly grid.
    pub friendly_origin: Position,
    /// Base every friendly is homed at on reset.
    pub home_base: String,
    pub enemy_count: usize,
    /// Half-range of oscillating enemy patterns.
    pub enemy_half_range: f32,
    /// Radius of circular enemy patterns.
    pub enemy_radius: f32,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            friendly_count: 12,
            friendly_columns: 4,
            friendly_spacing: 80.0,
            friendly_origin: Position::new(200.0, 200.0),
            home_base: "alpha".to_owned(),
            enemy_count: 6,
            enemy_half_range: 120.0,
            enemy_radius: 80.0,
        }
    }
}

/// Tunables for a swarm world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwarmConfig {
    /// Width of the world in world units.
    pub world_width: f32,
    /// Height of the world in world units.
    pub world_height: f32,
    /// Target tick rate; the nominal tick duration is `1 / tick_hz`.
    pub tick_hz: f32,
    pub friendly_speed: f32,
    pub enemy_speed: f32,
    /// Distance below which moving, patrolling and grouped agents count as arrived.
    pub arrival_epsilon: f32,
    /// Tighter arrival tolerance used while dispersing.
    pub dispersion_epsilon: f32,
    /// Braking radius while dispersing, as a multiple of `speed * dt`.
    pub braking_factor: f32,
    /// Distance between neighbouring dispersion grid cells.
    pub dispersion_spacing: f32,
    /// Agents collide when closer than twice this radius.
    pub hit_radius: f32,
    /// Standoff used by tail commands that do not name one.
    pub tail_distance: f32,
    /// Band around the standoff inside which a tailing agent holds position.
    pub tail_dead_band: f32,
    /// Seconds of target motion the intercept predictor simulates.
    pub intercept_horizon: f32,
    /// Time step of the intercept search, in seconds.
    pub intercept_resolution: f32,
    /// Slack (seconds) granted when testing whether an aim point is reachable.
    pub intercept_slack: f32,
    /// Minimum drift before a stored intercept aim point is replaced.
    pub aim_tolerance: f32,
    /// Maximum number of world snapshots retained for time travel.
    pub history_capacity: usize,
    /// Ticks rewound by a single jump-back.
    pub jump_back_ticks: usize,
    pub stuck: StuckDetection,
    pub avoidance: AvoidanceThrottle,
    pub population: PopulationConfig,
    /// Optional RNG seed for reproducible enemy placement.
    pub rng_seed: Option<u64>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            world_width: 1_000.0,
            world_height: 1_000.0,
            tick_hz: 50.0,
            friendly_speed: 50.0,
            enemy_speed: 30.0,
            arrival_epsilon: 5.0,
            dispersion_epsilon: 1.0,
            braking_factor: 3.0,
            dispersion_spacing: 40.0,
            hit_radius: 10.0,
            tail_distance: 60.0,
            tail_dead_band: 5.0,
            intercept_horizon: 30.0,
            intercept_resolution: 0.1,
            intercept_slack: 0.05,
            aim_tolerance: 5.0,
            history_capacity: 1_500,
            jump_back_ticks: 250,
            stuck: StuckDetection::default(),
            avoidance: AvoidanceThrottle::default(),
            population: PopulationConfig::default(),
            rng_seed: None,
        }
    }
}

impl SwarmConfig {
    /// Nominal duration of one tick in seconds.
    #[must_use]
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_hz
    }

    /// World extent as `(width, height)`.
    #[must_use]
    pub fn bounds(&self) -> (f32, f32) {
        (self.world_width, self.world_height)
    }

    /// Collision distance between a friendly and an enemy.
    #[must_use]
    pub fn collision_range(&self) -> f32 {
        self.hit_radius * 2.0
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), WorldStateError> {
        if !(self.world_width > 0.0 && self.world_height > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "world dimensions must be positive",
            ));
        }
        if !(self.tick_hz > 0.0) {
            return Err(WorldStateError::InvalidConfig("tick_hz must be positive"));
        }
        if !(self.friendly_speed > 0.0 && self.enemy_speed > 0.0) {
            return Err(WorldStateError::InvalidConfig("agent speeds must be positive"));
        }
        if !(self.arrival_epsilon > 0.0 && self.dispersion_epsilon > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "arrival tolerances must be positive",
            ));
        }
        if self.dispersion_epsilon > self.arrival_epsilon {
            return Err(WorldStateError::InvalidConfig(
                "dispersion_epsilon cannot exceed arrival_epsilon",
            ));
        }
        if self.braking_factor < 0.0
            || !(self.dispersion_spacing > 0.0)
            || !(self.hit_radius > 0.0)
            || self.tail_distance < 0.0
            || self.tail_dead_band < 0.0
            || self.aim_tolerance < 0.0
        {
            return Err(WorldStateError::InvalidConfig(
                "spacing and hit radius must be positive; braking, tail and aim parameters non-negative",
            ));
        }
        if !(self.intercept_horizon > 0.0 && self.intercept_resolution > 0.0)
            || self.intercept_slack < 0.0
        {
            return Err(WorldStateError::InvalidConfig(
                "intercept horizon and resolution must be positive, slack non-negative",
            ));
        }
        if self.history_capacity == 0 {
            return Err(WorldStateError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        if self.stuck.movement_threshold < 0.0 || self.stuck.frames == 0 {
            return Err(WorldStateError::InvalidConfig(
                "stuck threshold must be non-negative and frames non-zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.avoidance.factor) || self.avoidance.radius < 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "avoidance factor must lie in [0, 1] and radius be non-negative",
            ));
        }
        if self.population.friendly_columns == 0 {
            return Err(WorldStateError::InvalidConfig(
                "friendly_columns must be non-zero",
            ));
        }
        if find_base(&self.population.home_base).is_none() {
            return Err(WorldStateError::InvalidConfig(
                "population home_base must name a known base",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SwarmConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_degenerate_world() {
        let config = SwarmConfig {
            world_width: 0.0,
            ..SwarmConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WorldStateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_loose_dispersion_tolerance() {
        let config = SwarmConfig {
            dispersion_epsilon: 8.0,
            ..SwarmConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(WorldStateError::InvalidConfig(
                "dispersion_epsilon cannot exceed arrival_epsilon"
            ))
        );
    }

    #[test]
    fn rejects_unknown_home_base() {
        let mut config = SwarmConfig::default();
        config.population.home_base = "delta".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nan_speeds() {
        let config = SwarmConfig {
            friendly_speed: f32::NAN,
            ..SwarmConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_layers_over_defaults() {
        let config: SwarmConfig =
            serde_json::from_str(r#"{ "tick_hz": 20.0, "stuck": { "enabled": true } }"#)
                .expect("config parses");
        assert_eq!(config.tick_hz, 20.0);
        assert!(config.stuck.enabled);
        assert_eq!(config.stuck.frames, 25);
        assert_eq!(config.world_width, 1_000.0);
    }
}
