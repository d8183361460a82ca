//! # Orchestration Engine
//!
//! Batch rotation over the worker fleet.
//!
//! ## Core Components
//!
//! - **partition**: splits the fleet into ordered fixed-size batches
//! - **BatchLauncher**: starts a batch concurrently and aggregates a [`BatchResult`]
//! - **CleanupCoordinator**: concurrent, idempotent stop of a batch or the whole fleet
//! - **BatchScheduler**: drives the state machine through launch, dwell and teardown
//! - **shutdown**: turns termination signals into cancellation of the scheduler

pub mod batch_result;
pub mod cleanup;
pub mod launcher;
pub mod partition;
pub mod scheduler;
pub mod shutdown;

pub use batch_result::{BatchResult, WorkerOutcome, WorkerOutcomeEntry};
pub use cleanup::{CleanupCoordinator, CleanupReport};
pub use launcher::BatchLauncher;
pub use partition::{partition, total_batches, Batch};
pub use scheduler::{BatchScheduler, RunSummary};
pub use shutdown::{listen_for_shutdown, shutdown_signal};
