//! Finite state machine for one provisioning run

use serde::{Deserialize, Serialize};

/// State of a provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No run started yet
    Idle,

    /// Resolving board parameters and tool paths into concrete steps
    Preparing,

    /// Executing the step at the given index
    Running(usize),

    /// Every step exited successfully
    Succeeded,

    /// The run failed at the step at the given index
    Failed(usize),
}

/// Run event
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Start assembling steps
    Prepare,

    /// A step began executing
    StepStarted(usize),

    /// The run completed successfully
    Succeeded,

    /// The run failed at the given step
    Failed(usize),
}

/// Provisioning run FSM
#[derive(Debug, Clone)]
pub struct RunFsm {
    state: RunState,
}

impl RunFsm {
    /// Create a new FSM in the idle state
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    /// Get current state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: RunEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (RunState::Idle, RunEvent::Prepare) => RunState::Preparing,

            (RunState::Preparing, RunEvent::StepStarted(n)) => RunState::Running(*n),
            // an action with no steps finishes straight out of Preparing,
            // and cancellation can fail a run before its first step
            (RunState::Preparing, RunEvent::Succeeded) => RunState::Succeeded,
            (RunState::Preparing, RunEvent::Failed(n)) => RunState::Failed(*n),

            (RunState::Running(_), RunEvent::StepStarted(n)) => RunState::Running(*n),
            (RunState::Running(_), RunEvent::Succeeded) => RunState::Succeeded,
            (RunState::Running(_), RunEvent::Failed(n)) => RunState::Failed(*n),

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for RunFsm {
    fn default() -> Self {
        Self::new()
    }
}
