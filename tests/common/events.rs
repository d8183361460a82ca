//! Status event collection helpers

use fleet_rotor::events::{StatusEvent, StatusEventKind};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Drain every event already buffered in `receiver`
pub fn drain(receiver: &mut broadcast::Receiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
        }
    }
}

pub fn names(events: &[StatusEvent]) -> Vec<&'static str> {
    events.iter().map(StatusEvent::name).collect()
}

pub fn count(events: &[StatusEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

/// Batch sizes in the order their `BatchStarted` events were published
pub fn started_batch_sizes(events: &[StatusEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            StatusEventKind::BatchStarted { worker_ids, .. } => Some(worker_ids.len()),
            _ => None,
        })
        .collect()
}
