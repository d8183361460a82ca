//! # Batch Scheduler
//!
//! Drives one run over the fleet: partition, launch a batch, dwell, tear the
//! batch down, advance. With `infinite_mode` the pass restarts from the first
//! batch until the run is interrupted.
//!
//! ## Flow
//!
//! ```text
//! Idle -> Partitioning -> BatchRunning -> BatchDwell -> BatchTeardown
//!                ^              ^                            |
//!                |              +---------- next batch ------+
//!                +------------- next cycle ------------------+--> Terminated
//! ```
//!
//! A single task drives the state machine; only the start and stop fan-outs
//! run concurrently. Cancellation is observed at every state boundary and
//! inside the dwell wait. A launch fan-out that is already in flight is
//! allowed to finish its join first, so a start never races the fleet-wide
//! stop on the same identity.

use super::cleanup::{CleanupCoordinator, CleanupReport};
use super::launcher::BatchLauncher;
use super::partition::{total_batches, Batch};
use crate::config::RotorConfig;
use crate::error::{FleetError, Result};
use crate::events::{EventPublisher, StatusEvent, StatusEventKind, TerminationReason};
use crate::execution::ExecutionDriver;
use crate::log_rotor;
use crate::models::WorkerStore;
use crate::state_machine::{ScheduleState, SchedulerEvent, SchedulerState, SchedulerStateMachine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Totals reported when a run ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub reason: TerminationReason,
    pub cycles_completed: u64,
    pub batches_processed: usize,
    pub workers_processed: usize,
    pub workers_started: usize,
    pub workers_failed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct RunCounters {
    cycles_completed: u64,
    batches_processed: usize,
    workers_processed: usize,
    workers_started: usize,
    workers_failed: usize,
}

enum DwellOutcome {
    Elapsed,
    Interrupted,
}

pub struct BatchScheduler {
    config: RotorConfig,
    store: WorkerStore,
    driver: Arc<dyn ExecutionDriver>,
    publisher: EventPublisher,
    launcher: BatchLauncher,
    cleanup: CleanupCoordinator,
    shutdown: CancellationToken,
    state_machine: SchedulerStateMachine,
    counters: RunCounters,
    run_id: Uuid,
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("run_id", &self.run_id)
            .field("driver", &self.driver.name())
            .field("workers", &self.store.len())
            .field("state", &self.state_machine.current_state())
            .finish()
    }
}

impl BatchScheduler {
    /// Create a scheduler with its own publisher and shutdown token.
    ///
    /// Fails with a configuration error before anything is started.
    pub fn new(
        config: RotorConfig,
        store: WorkerStore,
        driver: Arc<dyn ExecutionDriver>,
    ) -> Result<Self> {
        config.validate()?;
        let publisher = EventPublisher::new(config.event_channel_capacity);
        Ok(Self::assemble(
            config,
            store,
            driver,
            publisher,
            CancellationToken::new(),
        ))
    }

    fn assemble(
        config: RotorConfig,
        store: WorkerStore,
        driver: Arc<dyn ExecutionDriver>,
        publisher: EventPublisher,
        shutdown: CancellationToken,
    ) -> Self {
        let run_id = Uuid::new_v4();
        let launcher = BatchLauncher::new(Arc::clone(&driver), publisher.clone(), run_id, &config);
        let cleanup = CleanupCoordinator::new(Arc::clone(&driver), publisher.clone(), run_id);
        Self {
            config,
            store,
            driver,
            publisher,
            launcher,
            cleanup,
            shutdown,
            state_machine: SchedulerStateMachine::new(),
            counters: RunCounters::default(),
            run_id,
        }
    }

    /// Publish status events through `publisher` instead of an owned one
    pub fn with_publisher(self, publisher: EventPublisher) -> Self {
        Self::assemble(self.config, self.store, self.driver, publisher, self.shutdown)
    }

    /// Observe an externally owned shutdown token
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.state_machine.current_state()
    }

    pub fn schedule(&self) -> ScheduleState {
        self.state_machine.schedule()
    }

    pub fn total_batches(&self) -> usize {
        total_batches(self.store.len(), self.config.batch_size)
    }

    /// Run batches until the final cycle completes or the run is interrupted
    pub async fn run(&mut self) -> Result<RunSummary> {
        if let Err(e) = self.driver.ping().await {
            let failure = FleetError::from(e);
            let message = failure.to_string();
            error!(run_id = %self.run_id, driver = self.driver.name(), error = %message, "Cannot start run");
            self.state_machine.transition(SchedulerEvent::fail_with_error(&message))?;
            self.publish_terminated(TerminationReason::Failed(message));
            return Err(failure);
        }

        let total_batches = self.total_batches();
        info!(
            run_id = %self.run_id,
            driver = self.driver.name(),
            workers = self.store.len(),
            batch_size = self.config.batch_size,
            total_batches,
            infinite_mode = self.config.infinite_mode,
            dwell_seconds = self.config.batch_timeout_seconds,
            "Starting scheduler run"
        );
        self.publish(StatusEventKind::RunStarted {
            total_workers: self.store.len(),
            batch_size: self.config.batch_size,
            total_batches,
            infinite_mode: self.config.infinite_mode,
        });

        if self.shutdown.is_cancelled() {
            return Err(self.interrupt().await);
        }
        self.state_machine.transition(SchedulerEvent::BeginCycle)?;

        loop {
            let cycle = self.state_machine.schedule().cycle_number;
            log_rotor!(info, "CYCLE_STARTED", run_id: self.run_id, cycle: cycle);
            self.publish(StatusEventKind::CycleStarted { cycle });
            self.state_machine.transition(SchedulerEvent::LaunchBatch)?;

            loop {
                if self.shutdown.is_cancelled() {
                    return Err(self.interrupt().await);
                }
                let batch = self.current_batch();
                self.run_batch(&batch, total_batches).await?;

                if self.shutdown.is_cancelled() {
                    return Err(self.interrupt().await);
                }
                match self.dwell(batch.index).await {
                    DwellOutcome::Elapsed => {}
                    DwellOutcome::Interrupted => return Err(self.interrupt().await),
                }

                self.teardown(&batch).await?;
                // Also covers the last batch of a cycle, before finishing or restarting
                if self.shutdown.is_cancelled() {
                    return Err(self.interrupt().await);
                }
                if self.state_machine.schedule().cursor >= self.store.len() {
                    break;
                }
                self.state_machine.transition(SchedulerEvent::NextBatch)?;
            }

            self.counters.cycles_completed += 1;
            log_rotor!(
                info,
                "CYCLE_COMPLETED",
                run_id: self.run_id,
                cycle: cycle,
                batches_processed: self.counters.batches_processed,
                workers_processed: self.counters.workers_processed,
            );
            self.publish(StatusEventKind::CycleCompleted {
                cycle,
                batches_processed: self.counters.batches_processed,
                workers_processed: self.counters.workers_processed,
            });

            if !self.config.infinite_mode {
                self.state_machine.transition(SchedulerEvent::Finish)?;
                info!(
                    run_id = %self.run_id,
                    batches_processed = self.counters.batches_processed,
                    workers_processed = self.counters.workers_processed,
                    "Run completed"
                );
                return Ok(self.publish_terminated(TerminationReason::Completed));
            }

            self.state_machine.transition(SchedulerEvent::RestartCycle)?;
        }
    }

    /// Stop every environment of the fleet, whatever batch it belongs to
    pub async fn cleanup_fleet(&self) -> CleanupReport {
        log_rotor!(info, "FLEET_CLEANUP", run_id: self.run_id, workers: self.store.len());
        self.cleanup.stop_all(&self.store.identities()).await
    }

    /// Batch at the cursor, at most `batch_size` records
    fn current_batch(&self) -> Batch {
        let schedule = self.state_machine.schedule();
        Batch {
            index: schedule.batch_number,
            workers: self
                .store
                .window(schedule.cursor, self.config.batch_size)
                .to_vec(),
        }
    }

    async fn run_batch(&mut self, batch: &Batch, total_batches: usize) -> Result<()> {
        let cycle = self.state_machine.schedule().cycle_number;
        info!(
            run_id = %self.run_id,
            cycle,
            batch = batch.index + 1,
            total_batches,
            workers = batch.len(),
            "Launching batch"
        );
        self.publish(StatusEventKind::BatchStarted {
            cycle,
            batch_index: batch.index,
            total_batches,
            worker_ids: batch.worker_ids(),
        });

        let result = self.launcher.launch(batch).await;
        self.counters.workers_started += result.success_count;
        self.counters.workers_failed += result.failure_count;

        if result.all_failed() {
            let failure = FleetError::AllWorkersFailedInBatch {
                batch_index: batch.index,
                batch_size: batch.len(),
            };
            warn!(run_id = %self.run_id, cycle, error = %failure, "Batch will still dwell");
            self.publish(StatusEventKind::AllWorkersFailed {
                cycle,
                batch_index: batch.index,
            });
        }
        self.publish(StatusEventKind::BatchResult { cycle, result });

        self.state_machine.transition(SchedulerEvent::BatchLaunched)?;
        Ok(())
    }

    /// Hold the batch for exactly the configured timeout
    async fn dwell(&self, batch_index: usize) -> DwellOutcome {
        let cycle = self.state_machine.schedule().cycle_number;
        let timeout = self.config.batch_timeout();
        let interval = self.config.progress_interval();
        let started = Instant::now();

        let deadline = tokio::time::sleep_until(started + timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval_at(started + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return DwellOutcome::Interrupted,
                _ = &mut deadline => return DwellOutcome::Elapsed,
                _ = ticker.tick() => {
                    let elapsed = started.elapsed();
                    self.publish(StatusEventKind::DwellTick {
                        cycle,
                        batch_index,
                        elapsed_seconds: elapsed.as_secs(),
                        remaining_seconds: timeout.saturating_sub(elapsed).as_secs(),
                    });
                }
            }
        }
    }

    async fn teardown(&mut self, batch: &Batch) -> Result<()> {
        self.state_machine.transition(SchedulerEvent::DwellElapsed)?;
        let cycle = self.state_machine.schedule().cycle_number;

        let report = self.cleanup.stop_all(&batch.worker_ids()).await;
        self.counters.batches_processed += 1;
        self.counters.workers_processed += batch.len();

        self.publish(StatusEventKind::BatchTornDown {
            cycle,
            batch_index: batch.index,
            stopped: report.stopped,
            failed: report.failed,
        });
        self.state_machine.advance_cursor(batch.len())?;
        Ok(())
    }

    /// Fleet-wide safety-net cleanup, then report the interruption
    async fn interrupt(&mut self) -> FleetError {
        let schedule = self.state_machine.schedule();
        warn!(
            run_id = %self.run_id,
            cycle = schedule.cycle_number,
            batch = schedule.batch_number,
            state = %self.state_machine.current_state(),
            "Interrupted, stopping the whole fleet"
        );
        if let Err(e) = self.state_machine.transition(SchedulerEvent::Interrupt) {
            warn!(run_id = %self.run_id, error = %e, "Interrupt after termination");
        }

        let report = self.cleanup_fleet().await;
        self.publish_terminated(TerminationReason::Interrupted);

        FleetError::Interrupted {
            cycle: schedule.cycle_number,
            batch: schedule.batch_number,
            cleaned: report.stopped,
        }
    }

    fn publish_terminated(&self, reason: TerminationReason) -> RunSummary {
        let summary = RunSummary {
            run_id: self.run_id,
            reason: reason.clone(),
            cycles_completed: self.counters.cycles_completed,
            batches_processed: self.counters.batches_processed,
            workers_processed: self.counters.workers_processed,
            workers_started: self.counters.workers_started,
            workers_failed: self.counters.workers_failed,
        };
        self.publish(StatusEventKind::RunTerminated {
            reason,
            batches_processed: summary.batches_processed,
            workers_processed: summary.workers_processed,
            cycles_completed: summary.cycles_completed,
        });
        summary
    }

    fn publish(&self, kind: StatusEventKind) {
        self.publisher.publish(StatusEvent::new(self.run_id, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationError;
    use crate::execution::SimulatedDriver;
    use crate::models::{EgressEndpoint, WorkerRecord};

    fn store(n: u64) -> WorkerStore {
        WorkerStore::new(
            (1..=n)
                .map(|i| {
                    WorkerRecord::new(i, EgressEndpoint::parse("http://u:p@127.0.0.1:3128").unwrap())
                })
                .collect(),
        )
        .unwrap()
    }

    fn config(batch_size: usize) -> RotorConfig {
        RotorConfig {
            batch_size,
            batch_timeout_seconds: 30,
            progress_interval_seconds: 10,
            startup_grace_ms: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_run() {
        let err = BatchScheduler::new(config(0), store(3), Arc::new(SimulatedDriver::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            FleetError::Configuration(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_pass_terminates() {
        let driver = Arc::new(SimulatedDriver::new());
        let mut scheduler = BatchScheduler::new(config(2), store(3), driver.clone()).unwrap();

        let summary = scheduler.run().await.unwrap();
        assert_eq!(summary.reason, TerminationReason::Completed);
        assert_eq!(summary.batches_processed, 2);
        assert_eq!(summary.workers_processed, 3);
        assert_eq!(summary.cycles_completed, 1);
        assert_eq!(scheduler.state(), SchedulerState::Terminated);
        assert!(driver.running_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dwell_waits_full_timeout() {
        let mut scheduler =
            BatchScheduler::new(config(5), store(2), Arc::new(SimulatedDriver::new())).unwrap();
        let started = Instant::now();
        scheduler.run().await.unwrap();
        assert!(started.elapsed() >= std::time::Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_unavailable_driver_is_fatal() {
        let driver = Arc::new(SimulatedDriver::new().unavailable("daemon not running"));
        let mut scheduler = BatchScheduler::new(config(2), store(2), driver.clone()).unwrap();

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, FleetError::DriverUnavailable(_)));
        assert_eq!(scheduler.state(), SchedulerState::Terminated);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_cleans_fleet() {
        let driver = Arc::new(SimulatedDriver::new());
        driver.preload_running(2u64);
        let mut scheduler = BatchScheduler::new(config(2), store(3), driver.clone()).unwrap();
        scheduler.shutdown_token().cancel();

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, FleetError::Interrupted { cleaned: 1, .. }));
        assert!(driver.running_ids().is_empty());
        assert_eq!(driver.start_count(&1u64.into()), 0);
    }
}
