use tokio::sync::broadcast;
use std::sync::Arc;

use super::event_bus::EventBus;
use crate::events::Event;
use crate::infrastructure::logging::BoundaryLogger;

/// Broadcast-based implementation of EventBus
#[derive(Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<Event>,
    logger: Arc<BoundaryLogger>,
}

impl BroadcastEventBus {
    /// Create a new BroadcastEventBus with given capacity
    pub fn new(capacity: usize, logger: Arc<BoundaryLogger>) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx, logger }
    }

    /// Create with default capacity (1000 events)
    pub fn new_default(logger: Arc<BoundaryLogger>) -> Self {
        Self::new(1000, logger)
    }
}

impl EventBus for BroadcastEventBus {
    fn emit(&self, event: Event) {
        if !matches!(event, Event::Log { .. }) {
            self.logger.event_emit(event.project().unwrap_or("system"), event.kind());
        }

        // Emit event (ignore if no receivers)
        let _ = self.tx.send(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
