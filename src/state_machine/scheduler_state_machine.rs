use super::{
    errors::{StateMachineError, StateMachineResult},
    events::SchedulerEvent,
    states::SchedulerState,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Position of the scheduler within the fleet.
///
/// Lives only in process memory; a new run always starts at cycle 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    /// Starts at 1, increments only when the whole fleet is cycled again
    pub cycle_number: u64,
    /// Zero-based index of the current batch within the cycle
    pub batch_number: usize,
    /// Index of the first record of the current batch
    pub cursor: usize,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self {
            cycle_number: 1,
            batch_number: 0,
            cursor: 0,
        }
    }
}

/// Validated transitions for one scheduler run
#[derive(Debug, Clone, Default)]
pub struct SchedulerStateMachine {
    state: SchedulerState,
    schedule: ScheduleState,
}

impl SchedulerStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> SchedulerState {
        self.state
    }

    pub fn schedule(&self) -> ScheduleState {
        self.schedule
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply an event and return the new state
    pub fn transition(&mut self, event: SchedulerEvent) -> StateMachineResult<SchedulerState> {
        let target = Self::determine_target_state(self.state, &event)?;

        if let SchedulerEvent::RestartCycle = event {
            self.schedule.cycle_number += 1;
            self.schedule.batch_number = 0;
            self.schedule.cursor = 0;
        }

        debug!(
            from = %self.state,
            to = %target,
            event = event.event_type(),
            cycle = self.schedule.cycle_number,
            batch = self.schedule.batch_number,
            "Scheduler transition"
        );

        self.state = target;
        Ok(target)
    }

    /// Move the cursor past the batch being torn down
    pub fn advance_cursor(&mut self, batch_len: usize) -> StateMachineResult<ScheduleState> {
        if self.state != SchedulerState::BatchTeardown {
            return Err(StateMachineError::InvalidTransition {
                from: self.state.to_string(),
                event: "advance_cursor".to_string(),
            });
        }
        self.schedule.cursor += batch_len;
        self.schedule.batch_number += 1;
        Ok(self.schedule)
    }

    /// Determine the target state based on current state and event
    fn determine_target_state(
        current_state: SchedulerState,
        event: &SchedulerEvent,
    ) -> StateMachineResult<SchedulerState> {
        let target = match (current_state, event) {
            (SchedulerState::Terminated, _) => return Err(StateMachineError::Terminated),

            (SchedulerState::Idle, SchedulerEvent::BeginCycle) => SchedulerState::Partitioning,
            (SchedulerState::Partitioning, SchedulerEvent::LaunchBatch) => {
                SchedulerState::BatchRunning
            }
            (SchedulerState::BatchRunning, SchedulerEvent::BatchLaunched) => {
                SchedulerState::BatchDwell
            }
            (SchedulerState::BatchDwell, SchedulerEvent::DwellElapsed) => {
                SchedulerState::BatchTeardown
            }

            // Cycle boundary decisions
            (SchedulerState::BatchTeardown, SchedulerEvent::NextBatch) => {
                SchedulerState::BatchRunning
            }
            (SchedulerState::BatchTeardown, SchedulerEvent::RestartCycle) => {
                SchedulerState::Partitioning
            }
            (SchedulerState::BatchTeardown, SchedulerEvent::Finish) => SchedulerState::Terminated,

            (_, SchedulerEvent::Interrupt | SchedulerEvent::Fail(_)) => SchedulerState::Terminated,

            (from_state, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
