//! Shared fixtures for unit tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::application::ports::{BuildOutput, BuildRunner};
use crate::models::{IntegrationStatus, Project};
use crate::queue::{BuildCondition, IntegrationQueueItem, IntegrationQueueNotifier, IntegrationRequest};

/// Counts queue notifications instead of acting on them.
#[derive(Default)]
pub struct RecordingNotifier {
    entered: AtomicUsize,
    exits: Mutex<Vec<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn exits(&self) -> Vec<bool> {
        self.exits.lock().clone()
    }
}

impl IntegrationQueueNotifier for RecordingNotifier {
    fn notify_entering_integration_queue(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_exiting_integration_queue(&self, is_pending_item_cancelled: bool) {
        self.exits.lock().push(is_pending_item_cancelled);
    }
}

pub fn request_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .unwrap()
}

pub fn queue_item(project: &Arc<Project>, condition: BuildCondition) -> (IntegrationQueueItem, Arc<RecordingNotifier>) {
    let notifier = RecordingNotifier::new();
    let request = IntegrationRequest::new(condition, "test", None, request_time());
    let item = IntegrationQueueItem::new(Arc::clone(project), request, notifier.clone());
    (item, notifier)
}

/// BuildRunner that records which projects it ran.
///
/// `hold()` parks every run until `release()` is called; `hold_project()`
/// parks only that project's runs.
pub struct ScriptedRunner {
    runs: Mutex<Vec<String>>,
    status: Mutex<IntegrationStatus>,
    held: watch::Sender<bool>,
    held_projects: watch::Sender<BTreeSet<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        let (held_projects, _) = watch::channel(BTreeSet::new());
        Self {
            runs: Mutex::new(Vec::new()),
            status: Mutex::new(IntegrationStatus::Success),
            held,
            held_projects,
        }
    }

    pub fn with_status(self, status: IntegrationStatus) -> Self {
        *self.status.lock() = status;
        self
    }

    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }

    pub fn hold_project(&self, name: &str) {
        self.held_projects.send_modify(|names| {
            names.insert(name.to_string());
        });
    }

    pub fn release_project(&self, name: &str) {
        self.held_projects.send_modify(|names| {
            names.remove(name);
        });
    }

    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().clone()
    }
}

async fn wait_for_release(mut held: watch::Receiver<bool>) {
    let _ = held.wait_for(|held| !*held).await;
}

async fn wait_for_project_release(mut held: watch::Receiver<BTreeSet<String>>, project: String) {
    let _ = held.wait_for(|names| !names.contains(&project)).await;
}

#[async_trait]
impl BuildRunner for ScriptedRunner {
    async fn run(&self, _trace_id: &str, project: &Project, _request: &IntegrationRequest) -> Result<BuildOutput> {
        self.runs.lock().push(project.name.clone());
        wait_for_release(self.held.subscribe()).await;
        wait_for_project_release(self.held_projects.subscribe(), project.name.clone()).await;

        let status = *self.status.lock();
        Ok(BuildOutput {
            status,
            logs: vec![format!("built {}", project.name)],
            exit_code: Some(if status == IntegrationStatus::Success { 0 } else { 1 }),
        })
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached within 5s");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
