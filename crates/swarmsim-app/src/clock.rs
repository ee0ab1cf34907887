//! Fixed-rate tick loop driving a shared world.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use swarmsim_core::TickEvents;
use tracing::{debug, info};

use crate::SharedWorld;
use crate::command::CommandDrain;
use crate::control::ControlError;

/// Drives a [`SharedWorld`] one tick at a time, draining queued commands first.
pub struct SimulationClock {
    world: SharedWorld,
    drain: CommandDrain,
    period: Duration,
    stop: Arc<AtomicBool>,
}

/// Handle to a clock running on its own thread.
pub struct ClockHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<Result<u64, ControlError>>,
}

impl ClockHandle {
    /// Ask the loop to stop after the current tick and wait for it.
    ///
    /// Returns the number of ticks the loop ran.
    pub fn stop(self) -> Result<u64, ControlError> {
        self.stop.store(true, Ordering::Release);
        self.join()
    }

    /// Wait for the loop to finish on its own.
    pub fn join(self) -> Result<u64, ControlError> {
        self.join.join().map_err(|_| ControlError::ClockPanicked)?
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl SimulationClock {
    /// Clock ticking at `tick_hz`, falling back to 50 Hz for a non-positive rate.
    pub fn new(world: SharedWorld, drain: CommandDrain, tick_hz: f32) -> Self {
        let hz = if tick_hz.is_finite() && tick_hz > 0.0 {
            tick_hz
        } else {
            50.0
        };
        Self {
            world,
            drain,
            period: Duration::from_secs_f32(1.0 / hz),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Flag that stops [`SimulationClock::run`] when set.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Drain queued commands and advance the world by `dt` seconds under one lock.
    pub fn tick_once(&self, dt: Duration) -> Result<TickEvents, ControlError> {
        let mut world = self.world.lock()?;
        let applied = (self.drain)(&mut world);
        let events = world.step_with(dt.as_secs_f32());
        if applied > 0 || !events.destroyed.is_empty() || !events.dispersed.is_empty() {
            debug!(
                tick = %events.tick,
                applied,
                destroyed = events.destroyed.len(),
                dispersed = events.dispersed.len(),
                "tick"
            );
        }
        Ok(events)
    }

    /// Tick at the fixed rate until stopped or `max_ticks` have run.
    ///
    /// Each tick advances by the wall time since the previous one, capped at the
    /// nominal period, and sleeps for whatever is left of the period.
    pub fn run(&self, max_ticks: Option<u64>) -> Result<u64, ControlError> {
        info!(period_ms = self.period.as_secs_f64() * 1_000.0, "clock started");
        let mut ticks = 0_u64;
        let mut last = Instant::now()
            .checked_sub(self.period)
            .unwrap_or_else(Instant::now);
        while !self.stop.load(Ordering::Acquire) && max_ticks.is_none_or(|max| ticks < max) {
            let started = Instant::now();
            let dt = started.duration_since(last).min(self.period);
            last = started;
            self.tick_once(dt)?;
            ticks += 1;
            if let Some(remaining) = self.period.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }
        info!(ticks, "clock stopped");
        Ok(ticks)
    }

    /// Run the clock on a dedicated thread.
    pub fn spawn(self, max_ticks: Option<u64>) -> std::io::Result<ClockHandle> {
        let stop = self.stop_flag();
        let join = thread::Builder::new()
            .name("swarmsim-clock".into())
            .spawn(move || self.run(max_ticks))?;
        Ok(ClockHandle { stop, join })
    }
}
