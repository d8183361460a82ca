//! # Batch Results
//!
//! Per-worker start outcomes for one batch, aggregated by the launcher and
//! consumed immediately for reporting. Never persisted.

use crate::models::WorkerId;
use serde::{Deserialize, Serialize};

/// Start outcome of a single worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// The driver reported the environment running after the grace delay
    Started,
    /// Start was rejected, or the environment was not running after the grace delay
    Failed { reason: String },
}

impl WorkerOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOutcomeEntry {
    pub worker_id: WorkerId,
    pub outcome: WorkerOutcome,
}

/// Aggregated start outcomes of a batch, in original batch order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_index: usize,
    outcomes: Vec<WorkerOutcomeEntry>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl BatchResult {
    /// Build a result from outcomes already arranged in batch order
    pub fn from_outcomes(
        batch_index: usize,
        outcomes: impl IntoIterator<Item = (WorkerId, WorkerOutcome)>,
    ) -> Self {
        let outcomes: Vec<WorkerOutcomeEntry> = outcomes
            .into_iter()
            .map(|(worker_id, outcome)| WorkerOutcomeEntry { worker_id, outcome })
            .collect();
        let success_count = outcomes.iter().filter(|e| e.outcome.is_started()).count();
        let failure_count = outcomes.len() - success_count;

        Self {
            batch_index,
            outcomes,
            success_count,
            failure_count,
        }
    }

    pub fn outcomes(&self) -> &[WorkerOutcomeEntry] {
        &self.outcomes
    }

    pub fn outcome(&self, worker_id: &WorkerId) -> Option<&WorkerOutcome> {
        self.outcomes
            .iter()
            .find(|e| &e.worker_id == worker_id)
            .map(|e| &e.outcome)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// No worker of a non-empty batch came up
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.success_count == 0
    }

    pub fn failed_workers(&self) -> impl Iterator<Item = (&WorkerId, &str)> {
        self.outcomes.iter().filter_map(|e| match &e.outcome {
            WorkerOutcome::Failed { reason } => Some((&e.worker_id, reason.as_str())),
            WorkerOutcome::Started => None,
        })
    }
}
