//! # Execution Driver
//!
//! Narrow boundary between the scheduler and whatever actually creates the
//! isolated environment for a worker. The scheduler never manipulates an
//! environment directly; it only asks the driver to start, probe, stop or
//! read recent output, always keyed by worker identity.

use crate::models::{WorkerId, WorkerRecord};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lazily produced output lines of an environment
pub type OutputLines = BoxStream<'static, String>;

/// Reference to an environment created by a driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentHandle {
    pub worker_id: WorkerId,
    /// Name the driver addresses the environment by
    pub name: String,
    /// Runtime-assigned identifier, when the runtime reports one
    pub runtime_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver itself cannot operate (runtime missing, daemon down)
    #[error("Execution driver unavailable: {0}")]
    Unavailable(String),

    #[error("Runtime command failed for worker {worker_id}: {reason}")]
    CommandFailed { worker_id: WorkerId, reason: String },

    #[error("Runtime command for worker {worker_id} timed out after {seconds}s")]
    Timeout { worker_id: WorkerId, seconds: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    pub fn command_failed(worker_id: &WorkerId, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            worker_id: worker_id.clone(),
            reason: reason.into(),
        }
    }
}

/// Lifecycle operations the scheduler needs from an execution backend.
///
/// Implementations must tolerate `stop` on an environment that is already
/// stopped or gone, and must never block `is_running` or
/// `fetch_recent_output` on worker health.
#[async_trait]
pub trait ExecutionDriver: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Verify the backend is reachable before any batch runs
    async fn ping(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Create and start the environment for a worker
    async fn start(&self, record: &WorkerRecord) -> Result<EnvironmentHandle, DriverError>;

    /// Whether the worker's environment is currently running
    async fn is_running(&self, worker_id: &WorkerId) -> bool;

    /// Stop (and, depending on configuration, remove) the environment
    async fn stop(&self, worker_id: &WorkerId) -> Result<(), DriverError>;

    /// Most recent output lines, best-effort; may be empty
    async fn fetch_recent_output(&self, worker_id: &WorkerId, max_lines: usize) -> OutputLines;
}
