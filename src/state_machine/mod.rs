// Scheduler state machine
//
// Explicit state object owned by a single scheduler instance: lifecycle state,
// cycle number, batch number and cursor into the fleet. Nothing here is global.

pub mod errors;
pub mod events;
pub mod scheduler_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::SchedulerEvent;
pub use scheduler_state_machine::{ScheduleState, SchedulerStateMachine};
pub use states::SchedulerState;
