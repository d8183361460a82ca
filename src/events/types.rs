//! Status events produced by the scheduler for any presentation layer.

use crate::models::WorkerId;
use crate::orchestration::batch_result::BatchResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum TerminationReason {
    /// Every batch of the final cycle was processed
    Completed,
    /// External termination request
    Interrupted,
    /// Unrecoverable error
    Failed(String),
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A single status notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: StatusEventKind,
}

impl StatusEvent {
    pub fn new(run_id: Uuid, kind: StatusEventKind) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEventKind {
    RunStarted {
        total_workers: usize,
        batch_size: usize,
        total_batches: usize,
        infinite_mode: bool,
    },
    CycleStarted {
        cycle: u64,
    },
    BatchStarted {
        cycle: u64,
        batch_index: usize,
        total_batches: usize,
        worker_ids: Vec<WorkerId>,
    },
    WorkerStarted {
        worker_id: WorkerId,
    },
    WorkerFailed {
        worker_id: WorkerId,
        reason: String,
    },
    /// Recent output of a worker that failed to start
    WorkerOutput {
        worker_id: WorkerId,
        lines: Vec<String>,
    },
    BatchResult {
        cycle: u64,
        result: BatchResult,
    },
    AllWorkersFailed {
        cycle: u64,
        batch_index: usize,
    },
    DwellTick {
        cycle: u64,
        batch_index: usize,
        elapsed_seconds: u64,
        remaining_seconds: u64,
    },
    BatchTornDown {
        cycle: u64,
        batch_index: usize,
        stopped: usize,
        failed: usize,
    },
    WorkerStopFailed {
        worker_id: WorkerId,
        reason: String,
    },
    CycleCompleted {
        cycle: u64,
        batches_processed: usize,
        workers_processed: usize,
    },
    RunTerminated {
        reason: TerminationReason,
        batches_processed: usize,
        workers_processed: usize,
        cycles_completed: u64,
    },
}

impl StatusEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::CycleStarted { .. } => "cycle_started",
            Self::BatchStarted { .. } => "batch_started",
            Self::WorkerStarted { .. } => "worker_started",
            Self::WorkerFailed { .. } => "worker_failed",
            Self::WorkerOutput { .. } => "worker_output",
            Self::BatchResult { .. } => "batch_result",
            Self::AllWorkersFailed { .. } => "all_workers_failed",
            Self::DwellTick { .. } => "dwell_tick",
            Self::BatchTornDown { .. } => "batch_torn_down",
            Self::WorkerStopFailed { .. } => "worker_stop_failed",
            Self::CycleCompleted { .. } => "cycle_completed",
            Self::RunTerminated { .. } => "run_terminated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_flat_with_tag() {
        let event = StatusEvent::new(
            Uuid::nil(),
            StatusEventKind::WorkerFailed {
                worker_id: WorkerId::from("w9"),
                reason: "not running after grace delay".to_string(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "worker_failed");
        assert_eq!(json["worker_id"], "w9");
        assert_eq!(json["run_id"], Uuid::nil().to_string());
        assert_eq!(event.name(), "worker_failed");
    }

    #[test]
    fn test_termination_reason_display() {
        assert_eq!(TerminationReason::Completed.to_string(), "completed");
        assert_eq!(
            TerminationReason::Failed("driver".into()).to_string(),
            "failed: driver"
        );
    }
}
