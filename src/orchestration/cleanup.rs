//! # Cleanup Coordinator
//!
//! Stops the environments of a set of workers concurrently, the same
//! fan-out/join shape the launcher uses for starts. A failing stop is logged
//! and reported but never blocks the others, and stopping an environment that
//! is already gone counts as a no-op.

use crate::error::FleetError;
use crate::events::{EventPublisher, StatusEvent, StatusEventKind};
use crate::execution::ExecutionDriver;
use crate::models::WorkerId;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of stopping one worker
#[derive(Debug)]
enum StopOutcome {
    Stopped,
    AlreadyStopped,
    Failed(FleetError),
}

/// Counts from one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Environments that were running and are now stopped
    pub stopped: usize,
    /// Targets with nothing left to stop
    pub already_stopped: usize,
    pub failed: usize,
}

impl CleanupReport {
    pub fn targeted(&self) -> usize {
        self.stopped + self.already_stopped + self.failed
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Clone)]
pub struct CleanupCoordinator {
    driver: Arc<dyn ExecutionDriver>,
    publisher: EventPublisher,
    run_id: Uuid,
}

impl std::fmt::Debug for CleanupCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupCoordinator")
            .field("driver", &self.driver.name())
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl CleanupCoordinator {
    pub fn new(driver: Arc<dyn ExecutionDriver>, publisher: EventPublisher, run_id: Uuid) -> Self {
        Self {
            driver,
            publisher,
            run_id,
        }
    }

    /// Stop every listed worker concurrently and wait for all of them
    pub async fn stop_all(&self, worker_ids: &[WorkerId]) -> CleanupReport {
        let handles: Vec<_> = worker_ids
            .iter()
            .cloned()
            .map(|worker_id| {
                let coordinator = self.clone();
                tokio::spawn(async move { coordinator.stop_worker(worker_id).await })
            })
            .collect();

        let mut report = CleanupReport::default();
        for (worker_id, joined) in worker_ids.iter().zip(join_all(handles).await) {
            let outcome = joined.unwrap_or_else(|join_error| {
                StopOutcome::Failed(FleetError::worker_stop(
                    worker_id,
                    format!("stop task aborted: {join_error}"),
                ))
            });
            match outcome {
                StopOutcome::Stopped => report.stopped += 1,
                StopOutcome::AlreadyStopped => report.already_stopped += 1,
                StopOutcome::Failed(failure) => {
                    report.failed += 1;
                    warn!(run_id = %self.run_id, error = %failure, "Worker stop failed");
                    self.publisher.publish(StatusEvent::new(
                        self.run_id,
                        StatusEventKind::WorkerStopFailed {
                            worker_id: worker_id.clone(),
                            reason: failure.reason(),
                        },
                    ));
                }
            }
        }

        info!(
            run_id = %self.run_id,
            targeted = report.targeted(),
            stopped = report.stopped,
            already_stopped = report.already_stopped,
            failed = report.failed,
            "Cleanup pass finished"
        );
        report
    }

    async fn stop_worker(&self, worker_id: WorkerId) -> StopOutcome {
        let was_running = self.driver.is_running(&worker_id).await;

        // Stop unconditionally; an exited environment may still need removal
        match self.driver.stop(&worker_id).await {
            Ok(()) if was_running => StopOutcome::Stopped,
            Ok(()) => {
                debug!(%worker_id, "Environment was not running");
                StopOutcome::AlreadyStopped
            }
            Err(e) => StopOutcome::Failed(FleetError::worker_stop(&worker_id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::SimulatedDriver;

    fn ids(raw: &[&str]) -> Vec<WorkerId> {
        raw.iter().map(|id| WorkerId::from(*id)).collect()
    }

    #[tokio::test]
    async fn test_stop_failure_does_not_block_others() {
        let driver = Arc::new(SimulatedDriver::new().fail_stop("b", "daemon timeout"));
        for id in ["a", "b", "c"] {
            driver.preload_running(id);
        }
        let publisher = EventPublisher::default();
        let mut receiver = publisher.subscribe();

        let report = CleanupCoordinator::new(driver.clone(), publisher, Uuid::nil())
            .stop_all(&ids(&["a", "b", "c"]))
            .await;

        assert_eq!(report.stopped, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.is_clean());
        assert_eq!(driver.running_ids(), ids(&["b"]));

        let event = receiver.recv().await.unwrap();
        match event.kind {
            StatusEventKind::WorkerStopFailed { worker_id, reason } => {
                assert_eq!(worker_id.as_str(), "b");
                assert!(reason.ends_with("daemon timeout"));
                assert!(!reason.starts_with("Worker b failed to stop"));
            }
            other => panic!("expected stop failure event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let driver = Arc::new(SimulatedDriver::new());
        driver.preload_running("a");
        let coordinator = CleanupCoordinator::new(driver, EventPublisher::default(), Uuid::nil());

        let first = coordinator.stop_all(&ids(&["a", "b"])).await;
        assert_eq!(first.stopped, 1);
        assert_eq!(first.already_stopped, 1);

        let second = coordinator.stop_all(&ids(&["a", "b"])).await;
        assert_eq!(second.stopped, 0);
        assert_eq!(second.already_stopped, 2);
        assert!(second.is_clean());
    }
}
