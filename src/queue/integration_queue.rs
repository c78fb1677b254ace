use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::config::{HandlingMode, QueueConfiguration};
use super::item::IntegrationQueueItem;
use super::queue_set::QueueRegistry;
use super::request::IntegrationRequest;
use crate::models::{Project, ProjectActivity};

/// Result of handing an item to [`IntegrationQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// No pending duplicate; inserted at `index`.
    Added { index: usize },
    /// A less insistent pending item at `replaced_index` was removed and the
    /// new item inserted at `index`.
    Displaced { replaced_index: usize, index: usize },
    /// The project already had a pending item that wins under the queue's
    /// handling mode.
    Discarded,
}

#[derive(Debug, Default)]
struct BlockState {
    blocking_queue_names: BTreeSet<String>,
    in_use: bool,
}

/// An ordered, priority-aware queue of integration requests.
///
/// Position 0 is the item currently integrating: it is never reordered and
/// never treated as a duplicate. Two locks are involved:
/// - `items` guards the sequence; every operation holds it for its full
///   scan-decide-mutate cycle.
/// - `blocking` guards the cross-queue block set and the in-use flag, so
///   status checks never wait on queue mutation.
///
/// Cross-queue acquisition in [`IntegrationQueue::try_lock`] is additionally
/// serialised by `lock_sync`, shared by every queue of the owning set.
pub struct IntegrationQueue {
    config: QueueConfiguration,
    items: Mutex<Vec<IntegrationQueueItem>>,
    blocking: Mutex<BlockState>,
    lock_sync: Arc<Mutex<()>>,
    registry: Weak<QueueRegistry>,
}

impl IntegrationQueue {
    pub(crate) fn new(
        config: QueueConfiguration,
        lock_sync: Arc<Mutex<()>>,
        registry: Weak<QueueRegistry>,
    ) -> Self {
        Self {
            config,
            items: Mutex::new(Vec::new()),
            blocking: Mutex::new(BlockState::default()),
            lock_sync,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn configuration(&self) -> &QueueConfiguration {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Add an item, reconciling against any pending item of the same project.
    pub fn enqueue(&self, item: IntegrationQueueItem) -> EnqueueOutcome {
        let mut items = self.items.lock();

        if items.is_empty() {
            let index = self.insert(&mut items, item, None);
            return EnqueueOutcome::Added { index };
        }

        let pending = items
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, queued)| queued.belongs_to(item.project()))
            .map(|(index, _)| index);

        let Some(found_index) = pending else {
            let index = self.insert(&mut items, item, None);
            return EnqueueOutcome::Added { index };
        };

        let position = match self.config.handling_mode {
            HandlingMode::UseFirst => {
                info!(
                    queue = %self.name(),
                    project = %item.project().name,
                    "Project {} already on queue {} - cancelling new request",
                    item.project().name,
                    self.name()
                );
                return EnqueueOutcome::Discarded;
            }
            HandlingMode::ApplyForceBuildsReAdd => None,
            HandlingMode::ApplyForceBuildsReAddTop => Some(1),
            HandlingMode::ApplyForceBuildsReplace => Some(found_index),
        };

        let existing_condition = items[found_index].request().build_condition();
        if item.request().build_condition() <= existing_condition {
            info!(
                queue = %self.name(),
                project = %item.project().name,
                "Project {} already on queue {} with condition {} - cancelling new {} request",
                item.project().name,
                self.name(),
                existing_condition,
                item.request().build_condition()
            );
            return EnqueueOutcome::Discarded;
        }

        info!(
            queue = %self.name(),
            project = %item.project().name,
            mode = %self.config.handling_mode,
            "Project {} pending {} request on queue {} displaced by {} request",
            item.project().name,
            existing_condition,
            self.name(),
            item.request().build_condition()
        );

        let displaced = items.remove(found_index);
        displaced.notify_exiting(true);

        let index = self.insert(&mut items, item, position);
        EnqueueOutcome::Displaced {
            replaced_index: found_index,
            index,
        }
    }

    /// Pop the finished item at position 0.
    pub fn dequeue(&self) -> Option<IntegrationQueueItem> {
        let mut items = self.items.lock();
        Self::pop_head(&mut items)
    }

    /// Pop position 0 only if it belongs to `project`.
    ///
    /// Used by integrators finishing a build, so that an item that replaced a
    /// forcibly removed head is never popped by mistake.
    pub fn complete(&self, project: &Project) -> bool {
        let mut items = self.items.lock();
        match items.first() {
            Some(head) if head.belongs_to(project) => Self::pop_head(&mut items).is_some(),
            _ => false,
        }
    }

    /// Remove queued-but-not-started items for `project`; position 0 stays.
    pub fn remove_pending_request(&self, project: &Project) -> usize {
        self.remove_items(project, 1)
    }

    /// Remove every item for `project`, including one that is integrating.
    pub fn remove_project(&self, project: &Project) -> usize {
        self.remove_items(project, 0)
    }

    /// The request at position 0 if it belongs to `project` and no other
    /// queue currently blocks this one.
    pub fn get_next_request(&self, project: &Project) -> Option<IntegrationRequest> {
        if self.is_blocked() {
            return None;
        }
        self.items
            .lock()
            .first()
            .filter(|head| head.belongs_to(project))
            .map(|head| head.request().clone())
    }

    pub fn has_item_on_queue(&self, project: &Project) -> bool {
        self.items.lock().iter().any(|item| item.belongs_to(project))
    }

    pub fn has_item_pending_on_queue(&self, project: &Project) -> bool {
        self.items
            .lock()
            .iter()
            .skip(1)
            .any(|item| item.belongs_to(project))
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocking.lock().blocking_queue_names.is_empty()
    }

    pub fn is_in_use(&self) -> bool {
        self.blocking.lock().in_use
    }

    pub fn blocking_queue_names(&self) -> Vec<String> {
        self.blocking.lock().blocking_queue_names.iter().cloned().collect()
    }

    /// Acquire every queue in `lock_queue_names`, in order, and mark this
    /// queue in use. Returns `None` when this queue is blocked, already
    /// holds a lock, or any target
    /// is integrating; locks taken during a failed attempt are released in
    /// reverse order. Dropping the returned guard releases everything.
    pub fn try_lock(self: &Arc<Self>) -> Option<QueueLock> {
        let _sync = self.lock_sync.lock();

        if self.is_blocked() {
            debug!(
                queue = %self.name(),
                blocked_by = ?self.blocking_queue_names(),
                "Queue {} is blocked",
                self.name()
            );
            return None;
        }

        if self.is_in_use() {
            debug!(queue = %self.name(), "Queue {} is already integrating", self.name());
            return None;
        }

        let mut locked: Vec<Arc<IntegrationQueue>> = Vec::new();
        for lock_name in &self.config.lock_queue_names {
            let Some(target) = self.resolve(lock_name) else {
                warn!(
                    queue = %self.name(),
                    lock_queue = %lock_name,
                    "Queue {} names unknown lock queue {} - skipping",
                    self.name(),
                    lock_name
                );
                continue;
            };

            if Arc::ptr_eq(&target, self) {
                warn!(queue = %self.name(), "Queue {} lists itself as a lock queue - skipping", self.name());
                continue;
            }

            if !target.block_queue(self.name()) {
                debug!(
                    queue = %self.name(),
                    lock_queue = %lock_name,
                    "Queue {} could not lock {} (in use)",
                    self.name(),
                    lock_name
                );
                for acquired in locked.iter().rev() {
                    acquired.unblock_queue(self.name());
                }
                return None;
            }
            locked.push(target);
        }

        self.blocking.lock().in_use = true;

        Some(QueueLock {
            queue: Arc::clone(self),
            locked,
        })
    }

    /// Register `requestor` as blocking this queue. Fails while this queue
    /// is integrating.
    fn block_queue(&self, requestor: &str) -> bool {
        let mut state = self.blocking.lock();
        if state.in_use {
            return false;
        }
        state.blocking_queue_names.insert(requestor.to_string());
        true
    }

    fn unblock_queue(&self, requestor: &str) {
        self.blocking.lock().blocking_queue_names.remove(requestor);
    }

    fn resolve(&self, name: &str) -> Option<Arc<IntegrationQueue>> {
        let registry = self.registry.upgrade()?;
        let queues = registry.read();
        queues.get(name).cloned()
    }

    fn insert(
        &self,
        items: &mut Vec<IntegrationQueueItem>,
        item: IntegrationQueueItem,
        position: Option<usize>,
    ) -> usize {
        let index = position
            .unwrap_or_else(|| prioritised_index(items, item.priority()))
            .min(items.len());

        debug!(
            queue = %self.name(),
            project = %item.project().name,
            index = index,
            "Adding project {} to queue {} at position {}",
            item.project().name,
            self.name(),
            index
        );

        item.notify_entering();
        items.insert(index, item);
        index
    }

    fn pop_head(items: &mut Vec<IntegrationQueueItem>) -> Option<IntegrationQueueItem> {
        if items.is_empty() {
            return None;
        }
        let head = items.remove(0);
        head.notify_exiting(false);
        Some(head)
    }

    fn remove_items(&self, project: &Project, start: usize) -> usize {
        let mut items = self.items.lock();
        let drained = std::mem::take(&mut *items);
        let mut removed = 0;

        for (index, item) in drained.into_iter().enumerate() {
            if index >= start && item.belongs_to(project) {
                item.notify_exiting(index > 0);
                removed += 1;
            } else {
                items.push(item);
            }
        }

        if removed > 0 {
            info!(
                queue = %self.name(),
                project = %project.name,
                "Removed {} item(s) for project {} from queue {}",
                removed,
                project.name,
                self.name()
            );
        }
        removed
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let requests = self
            .items
            .lock()
            .iter()
            .enumerate()
            .map(|(index, item)| QueuedRequestSnapshot {
                project_name: item.project().name.clone(),
                activity: if index == 0 {
                    ProjectActivity::Building
                } else {
                    ProjectActivity::Pending
                },
                build_condition: item.request().build_condition().to_string(),
                source: item.request().source().to_string(),
                request_time: item.request().request_time().to_string(),
            })
            .collect();

        let state = self.blocking.lock();
        QueueSnapshot {
            name: self.name().to_string(),
            in_use: state.in_use,
            blocked_by: state.blocking_queue_names.iter().cloned().collect(),
            requests,
        }
    }
}

/// Index at which an item of `priority` goes when no position is forced.
///
/// Priority 0 always appends. Otherwise the item lands before the first
/// pending item whose priority is 0 or greater than its own, which keeps
/// equal priorities in arrival order.
fn prioritised_index(items: &[IntegrationQueueItem], priority: u32) -> usize {
    if priority == 0 || items.len() <= 1 {
        return items.len();
    }
    items
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, queued)| queued.priority() == 0 || queued.priority() > priority)
        .map(|(index, _)| index)
        .unwrap_or(items.len())
}

/// Held while a queue integrates; releases the cross-queue blocks on drop.
pub struct QueueLock {
    queue: Arc<IntegrationQueue>,
    locked: Vec<Arc<IntegrationQueue>>,
}

impl QueueLock {
    pub fn locked_queue_names(&self) -> Vec<&str> {
        self.locked.iter().map(|queue| queue.name()).collect()
    }
}

impl Drop for QueueLock {
    fn drop(&mut self) {
        let _sync = self.queue.lock_sync.lock();
        for queue in self.locked.iter().rev() {
            queue.unblock_queue(self.queue.name());
        }
        self.queue.blocking.lock().in_use = false;
    }
}

impl std::fmt::Debug for QueueLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueLock")
            .field("queue", &self.queue.name())
            .field("locked", &self.locked_queue_names())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuedRequestSnapshot {
    pub project_name: String,
    pub activity: ProjectActivity,
    pub build_condition: String,
    pub source: String,
    pub request_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub name: String,
    pub in_use: bool,
    pub blocked_by: Vec<String>,
    pub requests: Vec<QueuedRequestSnapshot>,
}
