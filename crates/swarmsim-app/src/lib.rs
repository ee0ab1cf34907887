//! Shared application plumbing for driving a live swarm simulation.

use std::sync::{Arc, Mutex};

use swarmsim_core::Simulation;

pub type SharedWorld = Arc<Mutex<Simulation>>;

pub mod clock;
pub mod command;
pub mod control;

pub use clock::{ClockHandle, SimulationClock};
pub use command::{
    CommandDrain, CommandReceiver, CommandSender, CommandSubmit, create_command_bus,
    drain_pending_commands, make_command_drain, make_command_submit,
};
pub use control::{ControlError, ControlHandle, StatusReport};

/// Default depth of the command bus.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Everything a front end needs to run one world: the shared state, a control
/// handle for readers and command producers, and the clock that ticks it.
pub struct Runtime {
    pub world: SharedWorld,
    pub control: ControlHandle,
    pub clock: SimulationClock,
}

impl Runtime {
    /// Wire `sim` to a fresh command bus and a clock at its configured tick rate.
    pub fn new(sim: Simulation) -> Self {
        let tick_hz = sim.config().tick_hz;
        let world: SharedWorld = Arc::new(Mutex::new(sim));
        let (sender, receiver) = create_command_bus(COMMAND_QUEUE_CAPACITY);
        let control = ControlHandle::new(Arc::clone(&world), sender);
        let clock = SimulationClock::new(Arc::clone(&world), make_command_drain(receiver), tick_hz);
        Self {
            world,
            control,
            clock,
        }
    }
}
