//! Core simulation engine for the drone swarm.
//!
//! A [`Simulation`] owns every agent, the command-group index, the history ring
//! and the clock flags. External surfaces drive it through [`Simulation::step`]
//! and [`apply_control_command`]; nothing here performs I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod agent;
pub mod base;
pub mod behavior;
pub mod collision;
pub mod command;
pub mod config;
pub mod group;
pub mod history;
pub mod intercept;
pub mod pattern;
pub mod world;

pub use agent::{Agent, AgentArena, AgentKey, AgentMode, GroupId, HomeBase, StuckTracker, Team};
pub use base::{BASES, Base, BaseShape, find_base};
pub use behavior::{BehaviorError, PeerView, StepOutcome, advance_agent};
pub use collision::resolve_collisions;
pub use command::{
    CommandError, CommandOutcome, ControlCommand, TaskCommand, TaskParams, apply_control_command,
};
pub use config::{
    AvoidanceThrottle, PopulationConfig, StuckDetection, SwarmConfig, WorldStateError,
};
pub use group::{CommandGroup, GroupCoordinator, dispersion_grid};
pub use history::{Cursor, HistoryBuffer, JumpReport, WorldSnapshot};
pub use intercept::{InterceptSolution, Trajectory, predict_intercept};
pub use pattern::{Axis, PatternKind, PatternMotion};
pub use world::{Simulation, TickEvents, WorldView};

const FULL_TURN: f32 = std::f32::consts::TAU;

/// Wrap an angle into `[0, 2π)`.
pub(crate) fn wrap_unsigned_angle(angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    let wrapped = angle.rem_euclid(FULL_TURN);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= FULL_TURN { 0.0 } else { wrapped }
}

/// Number of ticks processed since the last reset.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point on the world plane.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Position) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Unit vector pointing from `self` towards `other` together with the distance.
    ///
    /// Returns a zero direction when the points coincide.
    #[must_use]
    pub fn direction_to(self, other: Position) -> ((f32, f32), f32) {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let distance = dx.hypot(dy);
        if distance > 0.0 {
            ((dx / distance, dy / distance), distance)
        } else {
            ((0.0, 0.0), 0.0)
        }
    }

    /// Integrate `velocity` over `dt` seconds.
    #[must_use]
    pub fn integrate(self, velocity: Velocity, dt: f32) -> Self {
        Self::new(self.x + velocity.vx * dt, self.y + velocity.vy * dt)
    }

    /// Clamp into the box `[0, width] × [0, height]`.
    #[must_use]
    pub fn clamped(self, width: f32, height: f32) -> Self {
        Self::new(self.x.clamp(0.0, width), self.y.clamp(0.0, height))
    }

    /// Returns true when both coordinates are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Planar velocity in world units per second.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

impl Velocity {
    /// Construct a new velocity vector.
    #[must_use]
    pub const fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy }
    }

    /// Velocity of magnitude `speed` along the unit vector `direction`.
    #[must_use]
    pub fn along((dx, dy): (f32, f32), speed: f32) -> Self {
        Self::new(dx * speed, dy * speed)
    }

    /// The zero vector.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Magnitude of the vector.
    #[must_use]
    pub fn speed(self) -> f32 {
        self.vx.hypot(self.vy)
    }

    /// Returns true when both components are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.vx.is_finite() && self.vy.is_finite()
    }
}
