use std::sync::Arc;

use super::request::IntegrationRequest;
use crate::models::Project;

/// Callbacks fired when an item enters or leaves an integration queue.
///
/// Called while the queue's lock is held: implementations must not call back
/// into the queue.
pub trait IntegrationQueueNotifier: Send + Sync {
    fn notify_entering_integration_queue(&self);

    /// `is_pending_item_cancelled` is false for the item at position 0 (the
    /// one integrating) and true for anything that had not started yet.
    fn notify_exiting_integration_queue(&self, is_pending_item_cancelled: bool);
}

/// One request for one project, owned by exactly one queue at a time.
#[derive(Clone)]
pub struct IntegrationQueueItem {
    project: Arc<Project>,
    request: IntegrationRequest,
    notifier: Arc<dyn IntegrationQueueNotifier>,
}

impl IntegrationQueueItem {
    pub fn new(
        project: Arc<Project>,
        request: IntegrationRequest,
        notifier: Arc<dyn IntegrationQueueNotifier>,
    ) -> Self {
        Self {
            project,
            request,
            notifier,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn request(&self) -> &IntegrationRequest {
        &self.request
    }

    pub fn priority(&self) -> u32 {
        self.project.queue_priority
    }

    pub fn belongs_to(&self, project: &Project) -> bool {
        self.project.is_same_project(project)
    }

    pub(crate) fn notify_entering(&self) {
        self.notifier.notify_entering_integration_queue();
    }

    pub(crate) fn notify_exiting(&self, is_pending_item_cancelled: bool) {
        self.notifier.notify_exiting_integration_queue(is_pending_item_cancelled);
    }
}

impl std::fmt::Debug for IntegrationQueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationQueueItem")
            .field("project", &self.project.name)
            .field("request", &self.request)
            .finish()
    }
}
