use super::types::StatusEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Broadcast publisher for scheduler status events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<StatusEvent>,
    published: Arc<AtomicU64>,
}

/// Publisher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPublisherStats {
    pub published: u64,
    pub subscribers: usize,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Having no subscribers is not an error; the event is simply dropped.
    pub fn publish(&self, event: StatusEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(event).is_err() {
            tracing::trace!("Status event published with no subscribers");
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> EventPublisherStats {
        EventPublisherStats {
            published: self.published.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000) // Default capacity of 1000 events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::StatusEventKind;
    use uuid::Uuid;

    fn cycle_started(cycle: u64) -> StatusEvent {
        StatusEvent::new(Uuid::nil(), StatusEventKind::CycleStarted { cycle })
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let publisher = EventPublisher::new(4);
        publisher.publish(cycle_started(1));
        assert_eq!(publisher.stats().published, 1);
        assert_eq!(publisher.stats().subscribers, 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();

        publisher.publish(cycle_started(1));
        publisher.publish(cycle_started(2));

        for expected in [1, 2] {
            match rx.recv().await.unwrap().kind {
                StatusEventKind::CycleStarted { cycle } => assert_eq!(cycle, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
