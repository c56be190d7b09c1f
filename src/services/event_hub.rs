use tokio::sync::broadcast;

use crate::models::JobEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Fire-and-forget sink for job lifecycle events. Implementations must never
/// block the caller and must accept events when nobody is listening.
pub trait EventHub: Send + Sync {
    fn broadcast(&self, event: JobEvent);
}

/// Event hub over a tokio broadcast channel. Slow subscribers lag and lose
/// the oldest events instead of holding up the scheduler.
#[derive(Clone)]
pub struct BroadcastEventHub {
    tx: broadcast::Sender<JobEvent>,
}

impl BroadcastEventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastEventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventHub for BroadcastEventHub {
    fn broadcast(&self, event: JobEvent) {
        // Err only means there are no subscribers right now
        let _ = self.tx.send(event);
    }
}
