use crate::config::ConfigurationError;
use crate::execution::DriverError;
use crate::models::WorkerId;
use crate::state_machine::StateMachineError;
use std::fmt;
use thiserror::Error;

/// Run-level error taxonomy.
///
/// `WorkerStart` and `WorkerStop` are recovered where they occur (launcher
/// and cleanup coordinator) and only surface as status events.
/// `AllWorkersFailedInBatch` is a warning; the batch still dwells. Everything
/// else ends the run.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Worker {worker_id} failed to start: {reason}")]
    WorkerStart { worker_id: WorkerId, reason: String },

    #[error("Worker {worker_id} failed to stop: {reason}")]
    WorkerStop { worker_id: WorkerId, reason: String },

    #[error("All {batch_size} workers of batch {batch_index} failed to start")]
    AllWorkersFailedInBatch {
        batch_index: usize,
        batch_size: usize,
    },

    #[error("Interrupted during cycle {cycle}, batch {batch}; {cleaned} workers stopped during cleanup")]
    Interrupted {
        cycle: u64,
        batch: usize,
        cleaned: usize,
    },

    #[error("Execution driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("Scheduler state error: {0}")]
    StateMachine(#[from] StateMachineError),
}

impl FleetError {
    pub fn worker_start(worker_id: &WorkerId, reason: impl fmt::Display) -> Self {
        Self::WorkerStart {
            worker_id: worker_id.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn worker_stop(worker_id: &WorkerId, reason: impl fmt::Display) -> Self {
        Self::WorkerStop {
            worker_id: worker_id.clone(),
            reason: reason.to_string(),
        }
    }

    /// Failure detail without the worker prefix, for events keyed by worker
    pub fn reason(&self) -> String {
        match self {
            Self::WorkerStart { reason, .. } | Self::WorkerStop { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }

    /// Process exit status the binary reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::Interrupted { .. } => 130,
            _ => 1,
        }
    }
}

/// Driver errors reaching the run level mean the backend cannot be used.
/// Worker-scoped driver errors are wrapped with [`FleetError::worker_start`]
/// or [`FleetError::worker_stop`] instead.
impl From<DriverError> for FleetError {
    fn from(error: DriverError) -> Self {
        match error {
            DriverError::Unavailable(reason) => Self::DriverUnavailable(reason),
            other => Self::DriverUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
