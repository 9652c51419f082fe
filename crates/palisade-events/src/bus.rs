//! In-process event fan-out.
//!
//! Each subscriber owns a bounded queue. Delivery is a non-blocking
//! `try_send`: a subscriber that falls behind loses events (counted, never
//! blocking the publisher). This is deliberate: slow SSE clients must not
//! back-pressure the supervisor.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::event::{EventKind, GatewayEvent};

/// Bounded queue capacity per subscriber.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

struct Subscriber {
    tx: mpsc::Sender<Arc<GatewayEvent>>,
    dropped: Arc<AtomicU64>,
}

/// Broadcast hub for gateway events.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<DashMap<u64, Subscriber>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns the number of subscribers that accepted the event (full
    /// queues drop it and bump that subscriber's drop counter).
    pub fn publish(&self, kind: EventKind) -> usize {
        self.publish_event(GatewayEvent::new(kind))
    }

    /// Publish an already-stamped event (shared with webhook fan-out so
    /// both paths carry the same timestamp).
    pub fn publish_event(&self, event: GatewayEvent) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0usize;

        for entry in self.subscribers.iter() {
            match entry.tx.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let total = entry.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        subscriber = *entry.key(),
                        dropped_total = total,
                        event_type = event.event_type(),
                        "subscriber queue full, event dropped"
                    );
                },
                // Receiver gone but not yet unregistered; skip.
                Err(mpsc::error::TrySendError::Closed(_)) => {},
            }
        }

        tracing::trace!(event_type = event.event_type(), delivered, "event published");
        delivered
    }

    /// Register a new subscriber with a bounded queue.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        self.subscribers.insert(
            id,
            Subscriber {
                tx,
                dropped: Arc::clone(&dropped),
            },
        );
        EventSubscription {
            id,
            rx,
            dropped,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

/// One subscriber's end of the bus. Unregisters itself on drop.
pub struct EventSubscription {
    id: u64,
    rx: mpsc::Receiver<Arc<GatewayEvent>>,
    dropped: Arc<AtomicU64>,
    subscribers: Arc<DashMap<u64, Subscriber>>,
}

impl EventSubscription {
    /// Receive the next event, waiting for one to arrive.
    ///
    /// Returns `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<Arc<GatewayEvent>> {
        self.rx.recv().await
    }

    /// Receive without waiting; `None` when the queue is empty.
    pub fn try_recv(&mut self) -> Option<Arc<GatewayEvent>> {
        self.rx.try_recv().ok()
    }

    /// Events dropped for this subscriber because its queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("id", &self.id)
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}
