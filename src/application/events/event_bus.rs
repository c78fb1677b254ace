use crate::events::Event;
use tokio::sync::broadcast;

/// Trait for event bus operations
///
/// `emit` is synchronous: queue notifiers publish while holding the queue
/// lock and must not await.
pub trait EventBus: Send + Sync + Clone + 'static {
    /// Emit an event to all subscribers
    fn emit(&self, event: Event);

    /// Subscribe to events
    /// Returns a receiver for listening to events
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}
