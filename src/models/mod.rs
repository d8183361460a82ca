pub mod worker_record;
pub mod worker_store;

// Re-export core models for easy access
pub use worker_record::{EgressEndpoint, WorkerId, WorkerRecord};
pub use worker_store::WorkerStore;
