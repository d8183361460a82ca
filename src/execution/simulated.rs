//! In-memory execution driver.
//!
//! Keeps an environment registry keyed by identity and never touches the
//! host. Backs the `--dry-run` mode of the binary and the test suites, so it
//! can be told which workers misbehave and records every call it receives.

use super::driver::{DriverError, EnvironmentHandle, ExecutionDriver, OutputLines};
use crate::models::{WorkerId, WorkerRecord};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A call received by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Start(WorkerId),
    IsRunning(WorkerId),
    Stop(WorkerId),
    FetchOutput(WorkerId),
}

#[derive(Debug, Default)]
pub struct SimulatedDriver {
    /// Identities with a running environment
    running: DashSet<WorkerId>,
    /// Identities whose start is rejected, with the rejection reason
    start_failures: HashMap<WorkerId, String>,
    /// Identities that start but never report running
    silent_failures: Vec<WorkerId>,
    /// Identities whose start task panics
    start_panics: Vec<WorkerId>,
    /// Identities whose stop is rejected
    stop_failures: HashMap<WorkerId, String>,
    /// Tokens cancelled when the keyed identity is stopped
    stop_triggers: HashMap<WorkerId, CancellationToken>,
    output: HashMap<WorkerId, Vec<String>>,
    start_latency: Duration,
    unavailable: Option<String>,
    journal: Mutex<Vec<DriverCall>>,
    /// Operations currently in flight per identity
    in_flight: DashMap<WorkerId, usize>,
    overlapping: AtomicUsize,
    active_starts: AtomicUsize,
    peak_concurrent_starts: AtomicUsize,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every start by `latency`
    pub fn with_start_latency(mut self, latency: Duration) -> Self {
        self.start_latency = latency;
        self
    }

    /// Reject the start of `worker_id`
    pub fn fail_start(mut self, worker_id: impl Into<WorkerId>, reason: impl Into<String>) -> Self {
        self.start_failures.insert(worker_id.into(), reason.into());
        self
    }

    /// Accept the start of `worker_id` but never report it running
    pub fn exit_immediately(mut self, worker_id: impl Into<WorkerId>) -> Self {
        self.silent_failures.push(worker_id.into());
        self
    }

    /// Panic inside the start of `worker_id`
    pub fn panic_on_start(mut self, worker_id: impl Into<WorkerId>) -> Self {
        self.start_panics.push(worker_id.into());
        self
    }

    /// Cancel `token` as soon as `worker_id` is stopped, the way a signal
    /// arriving mid-teardown would
    pub fn cancel_on_stop(mut self, worker_id: impl Into<WorkerId>, token: CancellationToken) -> Self {
        self.stop_triggers.insert(worker_id.into(), token);
        self
    }

    /// Reject the stop of `worker_id`
    pub fn fail_stop(mut self, worker_id: impl Into<WorkerId>, reason: impl Into<String>) -> Self {
        self.stop_failures.insert(worker_id.into(), reason.into());
        self
    }

    pub fn with_output(mut self, worker_id: impl Into<WorkerId>, lines: Vec<String>) -> Self {
        self.output.insert(worker_id.into(), lines);
        self
    }

    /// Make `ping` fail as if the backend were down
    pub fn unavailable(mut self, reason: impl Into<String>) -> Self {
        self.unavailable = Some(reason.into());
        self
    }

    /// Mark an environment running without going through `start`
    pub fn preload_running(&self, worker_id: impl Into<WorkerId>) {
        self.running.insert(worker_id.into());
    }

    pub fn running_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.running.iter().map(|id| id.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_environment_running(&self, worker_id: &WorkerId) -> bool {
        self.running.contains(worker_id)
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.journal.lock().clone()
    }

    pub fn start_count(&self, worker_id: &WorkerId) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|call| matches!(call, DriverCall::Start(id) if id == worker_id))
            .count()
    }

    pub fn stop_count(&self, worker_id: &WorkerId) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|call| matches!(call, DriverCall::Stop(id) if id == worker_id))
            .count()
    }

    /// Highest number of starts observed in flight at the same time
    pub fn peak_concurrent_starts(&self) -> usize {
        self.peak_concurrent_starts.load(Ordering::SeqCst)
    }

    /// Start/stop operations that overlapped on the same identity
    pub fn overlapping_operations(&self) -> usize {
        self.overlapping.load(Ordering::SeqCst)
    }

    fn record(&self, call: DriverCall) {
        self.journal.lock().push(call);
    }

    fn enter(&self, worker_id: &WorkerId) {
        let mut count = self.in_flight.entry(worker_id.clone()).or_insert(0);
        if *count > 0 {
            self.overlapping.fetch_add(1, Ordering::SeqCst);
        }
        *count += 1;
    }

    fn exit(&self, worker_id: &WorkerId) {
        if let Some(mut count) = self.in_flight.get_mut(worker_id) {
            *count = count.saturating_sub(1);
        }
    }
}

#[async_trait]
impl ExecutionDriver for SimulatedDriver {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn ping(&self) -> Result<(), DriverError> {
        match &self.unavailable {
            Some(reason) => Err(DriverError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    async fn start(&self, record: &WorkerRecord) -> Result<EnvironmentHandle, DriverError> {
        let worker_id = &record.identity;
        self.record(DriverCall::Start(worker_id.clone()));
        self.enter(worker_id);

        let active = self.active_starts.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_concurrent_starts.fetch_max(active, Ordering::SeqCst);

        if !self.start_latency.is_zero() {
            tokio::time::sleep(self.start_latency).await;
        }

        self.active_starts.fetch_sub(1, Ordering::SeqCst);
        self.exit(worker_id);

        if self.start_panics.contains(worker_id) {
            panic!("simulated start of {worker_id} panicked");
        }
        if let Some(reason) = self.start_failures.get(worker_id) {
            return Err(DriverError::command_failed(worker_id, reason.clone()));
        }
        if !self.silent_failures.contains(worker_id) {
            self.running.insert(worker_id.clone());
        }

        Ok(EnvironmentHandle {
            worker_id: worker_id.clone(),
            name: format!("simulated-{worker_id}"),
            runtime_id: None,
        })
    }

    async fn is_running(&self, worker_id: &WorkerId) -> bool {
        self.record(DriverCall::IsRunning(worker_id.clone()));
        self.running.contains(worker_id)
    }

    async fn stop(&self, worker_id: &WorkerId) -> Result<(), DriverError> {
        self.record(DriverCall::Stop(worker_id.clone()));
        self.enter(worker_id);
        tokio::task::yield_now().await;
        self.exit(worker_id);

        if let Some(token) = self.stop_triggers.get(worker_id) {
            token.cancel();
        }
        if let Some(reason) = self.stop_failures.get(worker_id) {
            return Err(DriverError::command_failed(worker_id, reason.clone()));
        }
        self.running.remove(worker_id);
        Ok(())
    }

    async fn fetch_recent_output(&self, worker_id: &WorkerId, max_lines: usize) -> OutputLines {
        self.record(DriverCall::FetchOutput(worker_id.clone()));
        let lines = self.output.get(worker_id).cloned().unwrap_or_default();
        let skip = lines.len().saturating_sub(max_lines);
        futures::stream::iter(lines.into_iter().skip(skip)).boxed()
    }
}
