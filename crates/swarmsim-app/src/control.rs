use std::sync::{MutexGuard, PoisonError};

use crossfire::TrySendError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use swarmsim_core::{
    CommandError, CommandOutcome, ControlCommand, Simulation, Team, WorldView,
    apply_control_command,
};

use crate::SharedWorld;
use crate::command::CommandSender;

/// Health summary of the running world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    pub tick: u64,
    pub friendly_count: usize,
    pub enemy_count: usize,
    pub paused: bool,
    pub reversing: bool,
    pub history_len: usize,
    pub open_groups: usize,
}

impl StatusReport {
    fn from_world(sim: &Simulation) -> Self {
        let friendly_count = sim
            .agents()
            .iter()
            .filter(|agent| agent.team == Team::Friendly)
            .count();
        Self {
            tick: sim.tick().0,
            friendly_count,
            enemy_count: sim.agents().len() - friendly_count,
            paused: sim.is_paused(),
            reversing: sim.is_reversing(),
            history_len: sim.history().len(),
            open_groups: sim.groups().len(),
        }
    }
}

/// Errors produced at the control boundary.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to lock world state")]
    Lock,
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("command queue is full; retry later")]
    CommandQueueFull,
    #[error("command queue has been closed")]
    CommandQueueClosed,
    #[error("clock thread panicked")]
    ClockPanicked,
}

impl From<PoisonError<MutexGuard<'_, Simulation>>> for ControlError {
    fn from(_: PoisonError<MutexGuard<'_, Simulation>>) -> Self {
        ControlError::Lock
    }
}

/// Shared handle used by front ends and command producers to reach the running world.
#[derive(Clone)]
pub struct ControlHandle {
    shared_world: SharedWorld,
    commands: CommandSender,
}

impl ControlHandle {
    pub fn new(shared_world: SharedWorld, commands: CommandSender) -> Self {
        Self {
            shared_world,
            commands,
        }
    }

    fn lock_world(&self) -> Result<MutexGuard<'_, Simulation>, ControlError> {
        self.shared_world.lock().map_err(|err| err.into())
    }

    /// Current world state for readers.
    pub fn view(&self) -> Result<WorldView, ControlError> {
        Ok(self.lock_world()?.view())
    }

    pub fn status(&self) -> Result<StatusReport, ControlError> {
        let world = self.lock_world()?;
        Ok(StatusReport::from_world(&world))
    }

    /// Apply `command` between ticks and return its outcome.
    pub fn execute(&self, command: ControlCommand) -> Result<CommandOutcome, ControlError> {
        let mut world = self.lock_world()?;
        Ok(apply_control_command(&mut world, command)?)
    }

    /// Queue `command` for the clock to apply at the start of the next tick.
    pub fn enqueue(&self, command: ControlCommand) -> Result<(), ControlError> {
        match self.commands.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_msg)) => Err(ControlError::CommandQueueFull),
            Err(TrySendError::Disconnected(_msg)) => Err(ControlError::CommandQueueClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use swarmsim_core::{Position, SwarmConfig};

    fn handle() -> (ControlHandle, crate::command::CommandReceiver) {
        let config = SwarmConfig {
            rng_seed: Some(11),
            ..SwarmConfig::default()
        };
        let world = Simulation::new(config).expect("world");
        let (sender, receiver) = crate::command::create_command_bus(4);
        let handle = ControlHandle::new(Arc::new(Mutex::new(world)), sender);
        (handle, receiver)
    }

    #[test]
    fn status_counts_teams() {
        let (handle, _receiver) = handle();
        let status = handle.status().expect("status");
        assert_eq!(status.friendly_count, 12);
        assert_eq!(status.enemy_count, 6);
        assert_eq!(status.tick, 0);
        assert_eq!(status.history_len, 1);
    }

    #[test]
    fn execute_surfaces_command_errors() {
        let (handle, _receiver) = handle();
        let err = handle
            .execute(ControlCommand::Task {
                task: "orbit".into(),
                params: Default::default(),
            })
            .expect_err("unknown task");
        assert!(matches!(
            err,
            ControlError::Command(CommandError::UnknownTask(_))
        ));
    }

    #[test]
    fn enqueued_commands_wait_for_drain() {
        let (handle, receiver) = handle();
        handle
            .enqueue(ControlCommand::Move {
                agent_ids: vec!["drone_1".into(), "drone_2".into()],
                target: Position::new(600.0, 600.0),
            })
            .expect("enqueue");
        assert_eq!(handle.status().expect("status").open_groups, 0);

        let mut world = handle.lock_world().expect("world lock");
        crate::command::drain_pending_commands(&receiver, &mut world);
        assert_eq!(world.groups().len(), 1);
    }

    #[test]
    fn closed_queue_is_reported() {
        let (handle, receiver) = handle();
        drop(receiver);
        let err = handle.enqueue(ControlCommand::Pause).expect_err("closed");
        assert!(matches!(err, ControlError::CommandQueueClosed));
    }
}
