pub mod console;
pub mod publisher;
pub mod types;

// Re-export key types for convenience
pub use console::ConsoleReporter;
pub use publisher::{EventPublisher, EventPublisherStats};
pub use types::{StatusEvent, StatusEventKind, TerminationReason};
