use thiserror::Error;

/// Error types for scheduler state machine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("State machine already terminated")]
    Terminated,
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
