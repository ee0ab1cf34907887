//! Deterministic autonomous motion profiles for enemy agents.

use serde::{Deserialize, Serialize};

use crate::{Position, Velocity, wrap_unsigned_angle};

/// Axis an oscillating pattern travels along.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Pattern family names used by commands and snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    UpDown,
    LeftRight,
    Circular,
}

/// Pattern parameters plus the mutable state needed to continue the motion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternMotion {
    /// Back-and-forth travel along one axis around `center`.
    Oscillate {
        axis: Axis,
        center: Position,
        half_range: f32,
        /// `1.0` or `-1.0`.
        direction: f32,
    },
    /// Constant-speed orbit around `center`.
    Circular {
        center: Position,
        radius: f32,
        /// Current angle in radians, kept in `[0, 2π)`.
        phase: f32,
    },
}

impl PatternMotion {
    /// Oscillation anchored at `center`, starting in the positive direction.
    #[must_use]
    pub fn oscillate(axis: Axis, center: Position, half_range: f32) -> Self {
        Self::Oscillate {
            axis,
            center,
            half_range: half_range.abs(),
            direction: 1.0,
        }
    }

    /// Orbit around `center` starting at `phase`.
    #[must_use]
    pub fn circular(center: Position, radius: f32, phase: f32) -> Self {
        Self::Circular {
            center,
            radius: radius.abs(),
            phase: wrap_unsigned_angle(phase),
        }
    }

    /// Build a pattern of `kind` anchored at `center`, with `extent` as the half-range or radius.
    #[must_use]
    pub fn from_kind(kind: PatternKind, center: Position, extent: f32) -> Self {
        match kind {
            PatternKind::UpDown => Self::oscillate(Axis::Vertical, center, extent),
            PatternKind::LeftRight => Self::oscillate(Axis::Horizontal, center, extent),
            PatternKind::Circular => Self::circular(center, extent, 0.0),
        }
    }

    #[must_use]
    pub fn kind(&self) -> PatternKind {
        match self {
            Self::Oscillate {
                axis: Axis::Vertical,
                ..
            } => PatternKind::UpDown,
            Self::Oscillate {
                axis: Axis::Horizontal,
                ..
            } => PatternKind::LeftRight,
            Self::Circular { .. } => PatternKind::Circular,
        }
    }

    /// Position the pattern prescribes for the current phase, if it prescribes one.
    ///
    /// Circular patterns fully determine position; oscillations integrate from wherever
    /// the agent currently is.
    #[must_use]
    pub fn anchor(&self) -> Option<Position> {
        match *self {
            Self::Circular {
                center,
                radius,
                phase,
            } => Some(Position::new(
                center.x + radius * phase.cos(),
                center.y + radius * phase.sin(),
            )),
            Self::Oscillate { .. } => None,
        }
    }

    /// Advance the pattern by `dt` seconds at `speed`, returning the new position and velocity.
    ///
    /// Oscillations turn around at the world edge when their range overhangs `bounds`.
    pub fn advance(
        &mut self,
        position: Position,
        speed: f32,
        dt: f32,
        bounds: (f32, f32),
    ) -> (Position, Velocity) {
        match self {
            Self::Oscillate {
                axis,
                center,
                half_range,
                direction,
            } => {
                let (coord, middle, limit) = match axis {
                    Axis::Horizontal => (position.x, center.x, bounds.0),
                    Axis::Vertical => (position.y, center.y, bounds.1),
                };
                let low = (middle - *half_range).clamp(0.0, limit);
                let high = (middle + *half_range).clamp(0.0, limit);
                let mut next = coord + *direction * speed * dt;
                if next >= high {
                    next = high;
                    *direction = -1.0;
                } else if next <= low {
                    next = low;
                    *direction = 1.0;
                }
                let along = speed * *direction;
                match axis {
                    Axis::Horizontal => (
                        Position::new(next, center.y),
                        Velocity::new(along, 0.0),
                    ),
                    Axis::Vertical => (
                        Position::new(center.x, next),
                        Velocity::new(0.0, along),
                    ),
                }
            }
            Self::Circular {
                center,
                radius,
                phase,
            } => {
                if *radius <= f32::EPSILON {
                    return (*center, Velocity::zero());
                }
                *phase = wrap_unsigned_angle(*phase + speed / *radius * dt);
                let (sin, cos) = phase.sin_cos();
                (
                    Position::new(center.x + *radius * cos, center.y + *radius * sin),
                    Velocity::new(-speed * sin, speed * cos),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    const WORLD: (f32, f32) = (1_000.0, 1_000.0);

    #[test]
    fn oscillation_bounces_at_range_edge() {
        let mut pattern = PatternMotion::oscillate(Axis::Vertical, Position::new(50.0, 50.0), 10.0);
        let (pos, vel) = pattern.advance(Position::new(50.0, 58.0), 10.0, 0.5, WORLD);
        assert_eq!(pos, Position::new(50.0, 60.0));
        assert_eq!(vel, Velocity::new(0.0, -10.0));

        let (pos, vel) = pattern.advance(pos, 10.0, 0.5, WORLD);
        assert_eq!(pos, Position::new(50.0, 55.0));
        assert_eq!(vel, Velocity::new(0.0, -10.0));
    }

    #[test]
    fn horizontal_oscillation_pins_cross_axis() {
        let mut pattern =
            PatternMotion::oscillate(Axis::Horizontal, Position::new(100.0, 40.0), 20.0);
        let (pos, vel) = pattern.advance(Position::new(100.0, 43.0), 10.0, 1.0, WORLD);
        assert_eq!(pos, Position::new(110.0, 40.0));
        assert_eq!(vel, Velocity::new(10.0, 0.0));
        assert_eq!(pattern.kind(), PatternKind::LeftRight);
    }

    #[test]
    fn oscillation_turns_at_world_edge_when_range_overhangs() {
        let mut pattern =
            PatternMotion::oscillate(Axis::Horizontal, Position::new(950.0, 500.0), 120.0);
        let mut pos = Position::new(950.0, 500.0);
        let mut max_x = pos.x;
        for _ in 0..60 {
            pos = pattern.advance(pos, 30.0, 0.1, WORLD).0;
            max_x = max_x.max(pos.x);
            assert!(pos.x <= WORLD.0);
        }
        assert_eq!(max_x, WORLD.0);
        // Reaches the edge after 50 units and spends the rest heading back.
        assert!(pos.x < 950.0, "stuck at {pos:?}");
        match pattern {
            PatternMotion::Oscillate { direction, .. } => assert_eq!(direction, -1.0),
            PatternMotion::Circular { .. } => unreachable!(),
        }
    }

    #[test]
    fn circular_velocity_is_tangent_with_pattern_speed() {
        let mut pattern = PatternMotion::circular(Position::new(0.0, 0.0), 10.0, 0.0);
        let (pos, vel) = pattern.advance(Position::new(10.0, 0.0), 5.0, 0.1, WORLD);
        let radial = (pos.x * vel.vx + pos.y * vel.vy).abs();
        assert!(radial < 1e-3, "velocity should be tangent, dot = {radial}");
        assert!((vel.speed() - 5.0).abs() < 1e-4);
        assert!((pos.distance(Position::new(0.0, 0.0)) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn circular_returns_to_start_after_full_period() {
        let radius = 50.0;
        let speed = 25.0;
        let start = Position::new(100.0 + radius, 100.0);
        let mut pattern = PatternMotion::circular(Position::new(100.0, 100.0), radius, 0.0);
        let period = TAU * radius / speed;
        let steps = 500;
        let dt = period / steps as f32;
        let mut pos = start;
        for _ in 0..steps {
            pos = pattern.advance(pos, speed, dt, WORLD).0;
        }
        assert!(pos.distance(start) < 0.05, "drifted to {pos:?}");
    }

    #[test]
    fn degenerate_circle_parks_on_center() {
        let mut pattern = PatternMotion::circular(Position::new(5.0, 5.0), 0.0, 1.0);
        let (pos, vel) = pattern.advance(Position::new(9.0, 9.0), 10.0, 0.1, WORLD);
        assert_eq!(pos, Position::new(5.0, 5.0));
        assert_eq!(vel, Velocity::zero());
    }
}
