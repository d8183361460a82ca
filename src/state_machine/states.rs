use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduler lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Created, nothing scheduled yet
    #[default]
    Idle,
    /// Computing the batches of a cycle
    Partitioning,
    /// Start attempts of the current batch are in flight
    BatchRunning,
    /// Holding the current batch alive for the dwell timeout
    BatchDwell,
    /// Stopping the workers of the current batch
    BatchTeardown,
    /// Run finished, interrupted or failed
    Terminated,
}

impl SchedulerState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Check if a batch currently owns live workers
    pub fn has_active_batch(&self) -> bool {
        matches!(
            self,
            Self::BatchRunning | Self::BatchDwell | Self::BatchTeardown
        )
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Partitioning => write!(f, "partitioning"),
            Self::BatchRunning => write!(f, "batch_running"),
            Self::BatchDwell => write!(f, "batch_dwell"),
            Self::BatchTeardown => write!(f, "batch_teardown"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

impl std::str::FromStr for SchedulerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "partitioning" => Ok(Self::Partitioning),
            "batch_running" => Ok(Self::BatchRunning),
            "batch_dwell" => Ok(Self::BatchDwell),
            "batch_teardown" => Ok(Self::BatchTeardown),
            "terminated" => Ok(Self::Terminated),
            _ => Err(format!("Invalid scheduler state: {s}")),
        }
    }
}
