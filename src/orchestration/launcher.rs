//! # Batch Launcher
//!
//! Starts every worker of a batch concurrently and aggregates the start
//! outcomes into a [`BatchResult`].
//!
//! ## Key Features
//!
//! - **Isolation**: each start runs in its own task; a failing or panicking
//!   worker never cancels or delays the others
//! - **Full barrier**: the result is returned only after every attempt resolved
//! - **Stable ordering**: outcomes follow batch order, not completion order
//! - **Best-effort diagnostics**: recent output of failed workers is fetched in
//!   a detached task and never holds up aggregation

use super::batch_result::{BatchResult, WorkerOutcome};
use super::partition::Batch;
use crate::config::RotorConfig;
use crate::error::{FleetError, Result};
use crate::events::{EventPublisher, StatusEvent, StatusEventKind};
use crate::execution::ExecutionDriver;
use crate::models::{WorkerId, WorkerRecord};
use futures::future::join_all;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct BatchLauncher {
    driver: Arc<dyn ExecutionDriver>,
    publisher: EventPublisher,
    run_id: Uuid,
    startup_grace: Duration,
    output_tail_lines: usize,
    output_fetch_timeout: Duration,
}

impl std::fmt::Debug for BatchLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLauncher")
            .field("driver", &self.driver.name())
            .field("run_id", &self.run_id)
            .field("startup_grace", &self.startup_grace)
            .finish()
    }
}

impl BatchLauncher {
    pub fn new(
        driver: Arc<dyn ExecutionDriver>,
        publisher: EventPublisher,
        run_id: Uuid,
        config: &RotorConfig,
    ) -> Self {
        Self {
            driver,
            publisher,
            run_id,
            startup_grace: config.startup_grace(),
            output_tail_lines: config.output_tail_lines,
            output_fetch_timeout: config.output_fetch_timeout(),
        }
    }

    /// Start every worker of `batch` and wait for all attempts to resolve
    pub async fn launch(&self, batch: &Batch) -> BatchResult {
        let started_at = Instant::now();

        let handles: Vec<_> = batch
            .workers
            .iter()
            .cloned()
            .map(|record| {
                let launcher = self.clone();
                tokio::spawn(async move { launcher.start_worker(record).await })
            })
            .collect();

        let joined = join_all(handles).await;

        let outcomes: Vec<(WorkerId, WorkerOutcome)> = batch
            .workers
            .iter()
            .zip(joined)
            .map(|(record, joined)| {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(join_error) => {
                        let failure = FleetError::worker_start(
                            &record.identity,
                            format!("start task aborted: {join_error}"),
                        );
                        warn!(run_id = %self.run_id, error = %failure, "Worker start task did not finish");
                        let outcome = WorkerOutcome::failed(failure.reason());
                        self.report(&record.identity, &outcome);
                        outcome
                    }
                };
                (record.identity.clone(), outcome)
            })
            .collect();

        let result = BatchResult::from_outcomes(batch.index, outcomes);

        info!(
            run_id = %self.run_id,
            batch = batch.index,
            started = result.success_count,
            failed = result.failure_count,
            duration_ms = started_at.elapsed().as_millis() as u64,
            "Batch launch resolved"
        );

        result
    }

    /// Start one worker and classify it after the grace delay
    async fn start_worker(&self, record: WorkerRecord) -> WorkerOutcome {
        let worker_id = record.identity.clone();

        let outcome = match self.try_start(&record).await {
            Ok(()) => WorkerOutcome::Started,
            Err(failure) => {
                debug!(run_id = %self.run_id, error = %failure, "Worker start failed");
                WorkerOutcome::failed(failure.reason())
            }
        };

        self.report(&worker_id, &outcome);
        if !outcome.is_started() {
            self.spawn_output_fetch(worker_id);
        }
        outcome
    }

    async fn try_start(&self, record: &WorkerRecord) -> Result<()> {
        let worker_id = &record.identity;
        let handle = self
            .driver
            .start(record)
            .await
            .map_err(|e| FleetError::worker_start(worker_id, e))?;

        debug!(
            %worker_id,
            environment = %handle.name,
            grace_ms = self.startup_grace.as_millis() as u64,
            "Environment started, waiting for grace delay"
        );
        tokio::time::sleep(self.startup_grace).await;

        if self.driver.is_running(worker_id).await {
            Ok(())
        } else {
            Err(FleetError::worker_start(
                worker_id,
                "environment not running after startup grace delay",
            ))
        }
    }

    fn report(&self, worker_id: &WorkerId, outcome: &WorkerOutcome) {
        let kind = match outcome {
            WorkerOutcome::Started => StatusEventKind::WorkerStarted {
                worker_id: worker_id.clone(),
            },
            WorkerOutcome::Failed { reason } => StatusEventKind::WorkerFailed {
                worker_id: worker_id.clone(),
                reason: reason.clone(),
            },
        };
        self.publisher.publish(StatusEvent::new(self.run_id, kind));
    }

    /// Fetch recent output of a failed worker without blocking aggregation
    fn spawn_output_fetch(&self, worker_id: WorkerId) {
        if self.output_tail_lines == 0 {
            return;
        }
        let driver = Arc::clone(&self.driver);
        let publisher = self.publisher.clone();
        let run_id = self.run_id;
        let max_lines = self.output_tail_lines;
        let timeout = self.output_fetch_timeout;

        tokio::spawn(async move {
            let fetch = async {
                driver
                    .fetch_recent_output(&worker_id, max_lines)
                    .await
                    .collect::<Vec<String>>()
                    .await
            };
            let fetched = tokio::time::timeout(timeout, fetch).await;
            match fetched {
                Ok(lines) if !lines.is_empty() => {
                    publisher.publish(StatusEvent::new(
                        run_id,
                        StatusEventKind::WorkerOutput { worker_id, lines },
                    ));
                }
                Ok(_) => debug!(%worker_id, "No output available for failed worker"),
                Err(_) => debug!(
                    %worker_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Output fetch timed out"
                ),
            }
        });
    }
}
