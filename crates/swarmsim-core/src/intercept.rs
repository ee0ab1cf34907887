//! Intercept aim-point prediction.
//!
//! The predictor forward-simulates a target's motion at a fixed time step and picks
//! the earliest sample a pursuer flying straight from its current position could
//! reach in time. It is a coarse pursuit approximation: callers refresh the aim
//! periodically and must tolerate a slightly suboptimal point.

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentMode};
use crate::config::SwarmConfig;
use crate::pattern::PatternMotion;
use crate::{Position, Velocity};

/// Something whose future position can be stepped forward.
pub trait Trajectory {
    /// Current predicted position.
    fn position(&self) -> Position;

    /// Advance the prediction by `dt` seconds.
    fn advance(&mut self, dt: f32);
}

/// Prediction for an enemy following a pattern.
#[derive(Debug, Clone, Copy)]
pub struct PatternTrajectory {
    pattern: PatternMotion,
    position: Position,
    speed: f32,
    bounds: (f32, f32),
}

impl PatternTrajectory {
    #[must_use]
    pub fn new(pattern: PatternMotion, position: Position, speed: f32, bounds: (f32, f32)) -> Self {
        Self {
            pattern,
            position,
            speed,
            bounds,
        }
    }
}

impl Trajectory for PatternTrajectory {
    fn position(&self) -> Position {
        self.position
    }

    fn advance(&mut self, dt: f32) {
        self.position = self
            .pattern
            .advance(self.position, self.speed, dt, self.bounds)
            .0
            .clamped(self.bounds.0, self.bounds.1);
    }
}

/// Constant-velocity extrapolation clamped to the world box.
#[derive(Debug, Clone, Copy)]
pub struct LinearTrajectory {
    position: Position,
    velocity: Velocity,
    bounds: (f32, f32),
}

impl LinearTrajectory {
    #[must_use]
    pub fn new(position: Position, velocity: Velocity, bounds: (f32, f32)) -> Self {
        Self {
            position,
            velocity,
            bounds,
        }
    }
}

impl Trajectory for LinearTrajectory {
    fn position(&self) -> Position {
        self.position
    }

    fn advance(&mut self, dt: f32) {
        self.position = self
            .position
            .integrate(self.velocity, dt)
            .clamped(self.bounds.0, self.bounds.1);
    }
}

/// Trajectory chosen from a target agent's current mode.
#[derive(Debug, Clone, Copy)]
pub enum TargetTrajectory {
    Pattern(PatternTrajectory),
    Linear(LinearTrajectory),
}

impl TargetTrajectory {
    /// Predict `target` using its pattern when it has one, otherwise its current velocity.
    #[must_use]
    pub fn of(target: &Agent, config: &SwarmConfig) -> Self {
        match &target.mode {
            AgentMode::Pattern { pattern } => Self::Pattern(PatternTrajectory::new(
                *pattern,
                target.position,
                config.enemy_speed,
                config.bounds(),
            )),
            _ => Self::Linear(LinearTrajectory::new(
                target.position,
                target.velocity,
                config.bounds(),
            )),
        }
    }
}

impl Trajectory for TargetTrajectory {
    fn position(&self) -> Position {
        match self {
            Self::Pattern(inner) => inner.position(),
            Self::Linear(inner) => inner.position(),
        }
    }

    fn advance(&mut self, dt: f32) {
        match self {
            Self::Pattern(inner) => inner.advance(dt),
            Self::Linear(inner) => inner.advance(dt),
        }
    }
}

/// Search parameters for [`predict_intercept`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterceptParams {
    pub horizon: f32,
    pub resolution: f32,
    pub slack: f32,
}

impl From<&SwarmConfig> for InterceptParams {
    fn from(config: &SwarmConfig) -> Self {
        Self {
            horizon: config.intercept_horizon,
            resolution: config.intercept_resolution,
            slack: config.intercept_slack,
        }
    }
}

/// Result of an intercept search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InterceptSolution {
    /// Point the pursuer should steer towards.
    pub aim: Position,
    /// Seconds until the predicted meeting; `None` when the search fell back to the
    /// target's current position.
    pub time: Option<f32>,
}

/// Earliest reachable point on `target`'s predicted path for a pursuer at `pursuer`.
pub fn predict_intercept<T: Trajectory>(
    pursuer: Position,
    speed: f32,
    mut target: T,
    params: InterceptParams,
) -> InterceptSolution {
    let current = target.position();
    let fallback = InterceptSolution {
        aim: current,
        time: None,
    };
    if !(speed > 0.0) || !(params.resolution > 0.0) {
        return fallback;
    }

    let reachable = |point: Position, t: f32| pursuer.distance(point) / speed <= t + params.slack;
    if reachable(current, 0.0) {
        return InterceptSolution {
            aim: current,
            time: Some(0.0),
        };
    }

    let steps = (params.horizon / params.resolution).ceil() as usize;
    for step in 1..=steps {
        target.advance(params.resolution);
        let t = step as f32 * params.resolution;
        let predicted = target.position();
        if reachable(predicted, t) {
            return InterceptSolution {
                aim: predicted,
                time: Some(t),
            };
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Axis;

    fn params() -> InterceptParams {
        InterceptParams {
            horizon: 30.0,
            resolution: 0.1,
            slack: 0.05,
        }
    }

    #[test]
    fn stationary_target_is_aimed_at_directly() {
        let target = LinearTrajectory::new(Position::new(100.0, 0.0), Velocity::zero(), (1e3, 1e3));
        let solution = predict_intercept(Position::new(0.0, 0.0), 50.0, target, params());
        assert_eq!(solution.aim, Position::new(100.0, 0.0));
        let t = solution.time.expect("solution");
        assert!((t - 2.0).abs() < 0.11, "t = {t}");
    }

    #[test]
    fn crossing_target_is_led() {
        let target =
            LinearTrajectory::new(Position::new(100.0, 0.0), Velocity::new(0.0, 20.0), (1e3, 1e3));
        let solution = predict_intercept(Position::new(0.0, 0.0), 50.0, target, params());
        let t = solution.time.expect("solution");
        assert!(solution.aim.y > 0.0, "aim should lead the target");
        assert!((solution.aim.y - 20.0 * t).abs() < 1e-3);
        let reach = Position::new(0.0, 0.0).distance(solution.aim) / 50.0;
        assert!(reach <= t + 0.05);
        let earlier = t - 0.1;
        let earlier_point = Position::new(100.0, 20.0 * earlier);
        assert!(Position::new(0.0, 0.0).distance(earlier_point) / 50.0 > earlier + 0.05);
    }

    #[test]
    fn unreachable_target_falls_back_to_current_position() {
        let target = LinearTrajectory::new(
            Position::new(500.0, 0.0),
            Velocity::new(100.0, 0.0),
            (1e6, 1e6),
        );
        let solution = predict_intercept(Position::new(0.0, 0.0), 10.0, target, params());
        assert_eq!(solution.time, None);
        assert_eq!(solution.aim, Position::new(500.0, 0.0));
    }

    #[test]
    fn pattern_targets_are_simulated_forward() {
        let pattern = PatternMotion::oscillate(Axis::Horizontal, Position::new(300.0, 300.0), 50.0);
        let target =
            PatternTrajectory::new(pattern, Position::new(300.0, 300.0), 30.0, (1e3, 1e3));
        let solution = predict_intercept(Position::new(300.0, 100.0), 50.0, target, params());
        let t = solution.time.expect("solution");
        // The target bounces off x = 350 after 5/3 s and is heading back when caught.
        assert!((250.0..=350.0).contains(&solution.aim.x));
        assert_eq!(solution.aim.y, 300.0);
        assert!((t - 4.0).abs() < 0.11, "t = {t}");
    }

    #[test]
    fn overhanging_pattern_is_predicted_inside_world() {
        let pattern = PatternMotion::oscillate(Axis::Horizontal, Position::new(950.0, 500.0), 120.0);
        let mut target = PatternTrajectory::new(pattern, Position::new(950.0, 500.0), 30.0, (1e3, 1e3));
        for _ in 0..100 {
            target.advance(0.1);
            assert!(target.position().x <= 1_000.0);
        }
        // Edge at step 17, back to 830 at step 74, then 26 steps up again.
        assert!((target.position().x - 908.0).abs() < 0.5, "at {:?}", target.position());
    }

    #[test]
    fn zero_speed_pursuer_uses_fallback() {
        let target = LinearTrajectory::new(Position::new(5.0, 5.0), Velocity::zero(), (1e3, 1e3));
        let solution = predict_intercept(Position::new(0.0, 0.0), 0.0, target, params());
        assert_eq!(solution.time, None);
    }
}
