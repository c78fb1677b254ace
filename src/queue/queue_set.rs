use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::config::QueueConfiguration;
use super::integration_queue::{IntegrationQueue, QueueSnapshot};

pub(crate) type QueueRegistry = RwLock<BTreeMap<String, Arc<IntegrationQueue>>>;

/// All named queues of one configuration load.
///
/// Owns the serialiser shared by every queue's `try_lock`, so cross-queue
/// acquisition is one critical section per set rather than per process.
pub struct IntegrationQueueSet {
    registry: Arc<QueueRegistry>,
    lock_sync: Arc<Mutex<()>>,
}

impl IntegrationQueueSet {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(BTreeMap::new())),
            lock_sync: Arc::new(Mutex::new(())),
        }
    }

    /// Create the queue for `config.name`, or return the existing one. The
    /// first configuration registered for a name wins.
    pub fn add(&self, config: QueueConfiguration) -> Arc<IntegrationQueue> {
        let mut queues = self.registry.write();
        if let Some(existing) = queues.get(&config.name) {
            debug!(queue = %config.name, "Queue {} already exists", config.name);
            return Arc::clone(existing);
        }

        let name = config.name.clone();
        let queue = Arc::new(IntegrationQueue::new(
            config,
            Arc::clone(&self.lock_sync),
            Arc::downgrade(&self.registry),
        ));
        queues.insert(name, Arc::clone(&queue));
        queue
    }

    pub fn get(&self, name: &str) -> Option<Arc<IntegrationQueue>> {
        self.registry.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    pub fn snapshot(&self) -> QueueSetSnapshot {
        let queues = self.registry.read().values().cloned().collect::<Vec<_>>();
        QueueSetSnapshot {
            queues: queues.iter().map(|queue| queue.snapshot()).collect(),
        }
    }
}

impl Default for IntegrationQueueSet {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSetSnapshot {
    pub queues: Vec<QueueSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::HandlingMode;

    #[test]
    fn test_first_configuration_wins() {
        let set = IntegrationQueueSet::new();
        let first = set.add(QueueConfiguration::new("q").with_handling_mode(HandlingMode::ApplyForceBuildsReplace));
        let second = set.add(QueueConfiguration::new("q"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.configuration().handling_mode, HandlingMode::ApplyForceBuildsReplace);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_lookup_by_name() {
        let set = IntegrationQueueSet::new();
        set.add(QueueConfiguration::new("b"));
        set.add(QueueConfiguration::new("a"));

        assert!(set.get("a").is_some());
        assert!(set.get("c").is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_snapshot_lists_every_queue() {
        let set = IntegrationQueueSet::new();
        set.add(QueueConfiguration::new("nightly"));
        set.add(QueueConfiguration::new("commit"));

        let snapshot = set.snapshot();
        assert_eq!(snapshot.queues.len(), 2);
        let names: Vec<&str> = snapshot.queues.iter().map(|queue| queue.name.as_str()).collect();
        assert_eq!(names, vec!["commit", "nightly"]);
        assert!(snapshot.queues.iter().all(|queue| queue.requests.is_empty()));
    }
}
