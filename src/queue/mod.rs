pub mod config;
pub mod integration_queue;
pub mod item;
pub mod queue_set;
pub mod request;

pub use config::{parse_lock_queue_names, HandlingMode, QueueConfiguration};
pub use integration_queue::{EnqueueOutcome, IntegrationQueue, QueueLock, QueueSnapshot, QueuedRequestSnapshot};
pub use item::{IntegrationQueueItem, IntegrationQueueNotifier};
pub use queue_set::{IntegrationQueueSet, QueueSetSnapshot};
pub use request::{BuildCondition, IntegrationRequest};
