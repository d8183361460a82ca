use serde::{Deserialize, Serialize};

/// Events that drive scheduler state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// Begin a cycle: partition the fleet
    BeginCycle,
    /// Partition ready, launch the next batch
    LaunchBatch,
    /// Every start attempt of the batch resolved
    BatchLaunched,
    /// Dwell timeout elapsed
    DwellElapsed,
    /// Batch stopped, more batches remain in this cycle
    NextBatch,
    /// Batch stopped, cycle over and another one follows
    RestartCycle,
    /// Batch stopped, no further cycles
    Finish,
    /// External termination request
    Interrupt,
    /// Unrecoverable error
    Fail(String),
}

impl SchedulerEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BeginCycle => "begin_cycle",
            Self::LaunchBatch => "launch_batch",
            Self::BatchLaunched => "batch_launched",
            Self::DwellElapsed => "dwell_elapsed",
            Self::NextBatch => "next_batch",
            Self::RestartCycle => "restart_cycle",
            Self::Finish => "finish",
            Self::Interrupt => "interrupt",
            Self::Fail(_) => "fail",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Check if this event always ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish | Self::Interrupt | Self::Fail(_))
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
