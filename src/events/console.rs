//! Console presentation of status events.
//!
//! Subscribes to an [`EventPublisher`](super::EventPublisher) and renders each
//! event as a structured log line. Lagging behind the channel only drops
//! notifications; it never affects scheduling.

use super::types::{StatusEvent, StatusEventKind, TerminationReason};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct ConsoleReporter;

impl ConsoleReporter {
    /// Render events until the publisher is dropped
    pub fn spawn(mut receiver: broadcast::Receiver<StatusEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => Self::render(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Console reporter lagged behind status events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn render(event: &StatusEvent) {
        let run_id = event.run_id;
        match &event.kind {
            StatusEventKind::RunStarted {
                total_workers,
                batch_size,
                total_batches,
                infinite_mode,
            } => info!(
                %run_id,
                total_workers,
                batch_size,
                total_batches,
                infinite_mode,
                "Run started"
            ),
            StatusEventKind::CycleStarted { cycle } => info!(%run_id, cycle, "Cycle started"),
            StatusEventKind::BatchStarted {
                cycle,
                batch_index,
                total_batches,
                worker_ids,
            } => {
                let workers: Vec<&str> = worker_ids.iter().map(|w| w.as_str()).collect();
                info!(
                    %run_id,
                    cycle,
                    batch = batch_index + 1,
                    total_batches,
                    workers = %workers.join(","),
                    "Batch started"
                );
            }
            StatusEventKind::WorkerStarted { worker_id } => {
                info!(%run_id, %worker_id, "Worker running")
            }
            StatusEventKind::WorkerFailed { worker_id, reason } => {
                warn!(%run_id, %worker_id, %reason, "Worker failed to start")
            }
            StatusEventKind::WorkerOutput { worker_id, lines } => {
                for line in lines {
                    warn!(%run_id, %worker_id, output = %line, "Worker output");
                }
            }
            StatusEventKind::BatchResult { cycle, result } => info!(
                %run_id,
                cycle,
                batch = result.batch_index + 1,
                started = result.success_count,
                failed = result.failure_count,
                "Batch start results"
            ),
            StatusEventKind::AllWorkersFailed { cycle, batch_index } => warn!(
                %run_id,
                cycle,
                batch = batch_index + 1,
                "No worker of the batch started; dwelling anyway"
            ),
            StatusEventKind::DwellTick {
                cycle,
                batch_index,
                elapsed_seconds,
                remaining_seconds,
            } => info!(
                %run_id,
                cycle,
                batch = batch_index + 1,
                elapsed_seconds,
                remaining_seconds,
                "Batch dwelling"
            ),
            StatusEventKind::BatchTornDown {
                cycle,
                batch_index,
                stopped,
                failed,
            } => info!(
                %run_id,
                cycle,
                batch = batch_index + 1,
                stopped,
                failed,
                "Batch torn down"
            ),
            StatusEventKind::WorkerStopFailed { worker_id, reason } => {
                warn!(%run_id, %worker_id, %reason, "Worker failed to stop")
            }
            StatusEventKind::CycleCompleted {
                cycle,
                batches_processed,
                workers_processed,
            } => info!(
                %run_id,
                cycle,
                batches_processed,
                workers_processed,
                "Cycle completed"
            ),
            StatusEventKind::RunTerminated {
                reason,
                batches_processed,
                workers_processed,
                cycles_completed,
            } => match reason {
                TerminationReason::Failed(_) => error!(
                    %run_id,
                    %reason,
                    batches_processed,
                    workers_processed,
                    cycles_completed,
                    "Run terminated"
                ),
                _ => info!(
                    %run_id,
                    %reason,
                    batches_processed,
                    workers_processed,
                    cycles_completed,
                    "Run terminated"
                ),
            },
        }
    }
}
