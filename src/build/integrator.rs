use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::application::events::{Event, EventBus};
use crate::application::ports::BuildRunner;
use crate::clock::Clock;
use crate::error::{QueueError, QueueResult};
use crate::infrastructure::logging::{BoundaryLogger, Timer, TraceContext};
use crate::models::{BuildSummary, IntegrationStatus, IntegratorState, Project, ProjectActivity, ProjectStatus};
use crate::queue::{
    BuildCondition, EnqueueOutcome, IntegrationQueue, IntegrationQueueItem, IntegrationQueueNotifier,
    IntegrationRequest,
};
use crate::triggers::Trigger;

/// ProjectIntegrator - 프로젝트별 통합 워커
///
/// 책임:
/// - 트리거 폴링 및 큐 등록
/// - 큐 선두(position 0)가 되면 교차 큐 락 획득 후 빌드 실행
/// - 빌드 완료 후 큐에서 제거 및 트리거 상태 갱신
/// - 큐 진입/이탈 알림 수신 (IntegrationQueueNotifier)
pub struct ProjectIntegrator<EB: EventBus> {
    project: Arc<Project>,
    queue: Arc<IntegrationQueue>,
    trigger: Mutex<Box<dyn Trigger>>,
    runner: Arc<dyn BuildRunner>,
    clock: Arc<dyn Clock>,
    event_bus: EB,
    logger: Arc<BoundaryLogger>,
    poll_interval: Duration,

    state: watch::Sender<IntegratorState>,
    abort: watch::Sender<bool>,
    wake: Notify,
    building: AtomicBool,
    queued_items: AtomicUsize,
    last_build: Mutex<Option<BuildSummary>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Everything an integrator needs besides its project, queue and trigger.
pub struct IntegratorDeps<EB: EventBus> {
    pub runner: Arc<dyn BuildRunner>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EB,
    pub logger: Arc<BoundaryLogger>,
    pub poll_interval: Duration,
}

impl<EB: EventBus> Clone for IntegratorDeps<EB> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            clock: Arc::clone(&self.clock),
            event_bus: self.event_bus.clone(),
            logger: Arc::clone(&self.logger),
            poll_interval: self.poll_interval,
        }
    }
}

impl<EB: EventBus> ProjectIntegrator<EB> {
    pub fn new(
        project: Arc<Project>,
        queue: Arc<IntegrationQueue>,
        trigger: Box<dyn Trigger>,
        deps: IntegratorDeps<EB>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(IntegratorState::Stopped);
        let (abort, _) = watch::channel(false);
        Arc::new(Self {
            project,
            queue,
            trigger: Mutex::new(trigger),
            runner: deps.runner,
            clock: deps.clock,
            event_bus: deps.event_bus,
            logger: deps.logger,
            poll_interval: deps.poll_interval,
            state,
            abort,
            wake: Notify::new(),
            building: AtomicBool::new(false),
            queued_items: AtomicUsize::new(0),
            last_build: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.project.name
    }

    pub fn queue(&self) -> &Arc<IntegrationQueue> {
        &self.queue
    }

    pub fn state(&self) -> IntegratorState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == IntegratorState::Running
    }

    pub fn activity(&self) -> ProjectActivity {
        if self.building.load(Ordering::SeqCst) {
            ProjectActivity::Building
        } else if self.queued_items.load(Ordering::SeqCst) > 0 {
            ProjectActivity::Pending
        } else {
            ProjectActivity::Sleeping
        }
    }

    pub fn last_build(&self) -> Option<BuildSummary> {
        self.last_build.lock().clone()
    }

    /// Spawn the worker. No-op unless the integrator is stopped.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if self.state() != IntegratorState::Stopped {
            info!("Integrator for project '{}' is already {}", self.name(), self.state());
            return;
        }

        self.abort.send_replace(false);
        self.set_state(IntegratorState::Running);

        let integrator = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            integrator.run().await;
        }));
    }

    /// Ask the worker to exit once the current integration (if any) finishes.
    pub fn stop(&self) {
        if self.state() == IntegratorState::Running {
            self.set_state(IntegratorState::Stopping);
            self.wake.notify_one();
        }
    }

    /// Stop, cancelling an integration in progress.
    pub fn abort(&self) {
        self.stop();
        self.abort.send_replace(true);
    }

    pub async fn wait_for_exit(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == IntegratorState::Stopped).await;

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Integrator task for project '{}' ended abnormally: {}", self.name(), e);
            }
        }
    }

    pub fn force_build(
        self: &Arc<Self>,
        enforcer: &str,
        parameters: BTreeMap<String, String>,
    ) -> QueueResult<EnqueueOutcome> {
        let request = IntegrationRequest::new(
            BuildCondition::ForceBuild,
            enforcer,
            Some(enforcer.to_string()),
            self.clock.now(),
        )
        .with_parameters(parameters);
        self.request(request)
    }

    pub fn request(self: &Arc<Self>, request: IntegrationRequest) -> QueueResult<EnqueueOutcome> {
        if !self.is_running() {
            return Err(QueueError::ProjectNotRunning(self.name().to_string()));
        }
        let outcome = self.add_to_queue(request);
        self.wake.notify_one();
        Ok(outcome)
    }

    /// Drop queued requests that have not started yet.
    pub fn cancel_pending_request(&self) -> usize {
        self.queue.remove_pending_request(&self.project)
    }

    pub fn status(&self) -> ProjectStatus {
        let next_build_time = self.trigger.lock().next_build().ok().map(|t| t.to_string());
        ProjectStatus {
            name: self.project.name.clone(),
            queue: self.queue.name().to_string(),
            queue_priority: self.project.queue_priority,
            state: self.state(),
            activity: self.activity(),
            last_build: self.last_build(),
            next_build_time,
        }
    }

    async fn run(self: Arc<Self>) {
        let trace_id = TraceContext::for_worker(self.name());
        info!("[{}] Integrator started for project '{}' on queue '{}'", trace_id, self.name(), self.queue.name());

        while self.is_running() {
            self.integrate(&trace_id).await;
            if !self.is_running() {
                break;
            }
            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = self.wake.notified() => {}
            }
        }

        self.queue.remove_project(&self.project);
        self.set_state(IntegratorState::Stopped);
        info!("[{}] Integrator stopped for project '{}'", trace_id, self.name());
    }

    /// One poll cycle: build if this project owns the head of the queue,
    /// otherwise ask the trigger whether to join the queue.
    async fn integrate(self: &Arc<Self>, trace_id: &str) {
        if let Some(request) = self.queue.get_next_request(&self.project) {
            let Some(lock) = self.queue.try_lock() else {
                self.logger.queue_transition(trace_id, self.queue.name(), self.name(), "LOCK-WAIT");
                return;
            };
            self.logger.queue_transition(trace_id, self.queue.name(), self.name(), "LOCKED");

            self.build(trace_id, &request).await;

            let completed = self.trigger.lock().integration_completed();
            if let Err(e) = completed {
                error!("[{}] Trigger for project '{}' failed to reschedule: {}", trace_id, self.name(), e);
                self.event_bus.emit(Event::error(Some(self.name()), e.to_string()));
            }

            drop(lock);
            self.queue.complete(&self.project);
            self.logger.queue_transition(trace_id, self.queue.name(), self.name(), "RELEASED");
            return;
        }

        if !self.queue.has_item_on_queue(&self.project) {
            self.poll_trigger(trace_id);
        }
    }

    fn poll_trigger(self: &Arc<Self>, trace_id: &str) {
        let fired = self.trigger.lock().fire();
        match fired {
            Ok(Some(request)) if request.build_condition() != BuildCondition::NoBuild => {
                debug!("[{}] Trigger fired for project '{}': {}", trace_id, self.name(), request);
                self.add_to_queue(request);
            }
            Ok(_) => {}
            Err(e) => {
                error!("[{}] Trigger for project '{}' failed: {}", trace_id, self.name(), e);
                self.event_bus.emit(Event::error(Some(self.name()), e.to_string()));
            }
        }
    }

    fn add_to_queue(self: &Arc<Self>, request: IntegrationRequest) -> EnqueueOutcome {
        let notifier: Arc<dyn IntegrationQueueNotifier> = Arc::clone(self) as Arc<dyn IntegrationQueueNotifier>;
        let item = IntegrationQueueItem::new(Arc::clone(&self.project), request, notifier);
        self.queue.enqueue(item)
    }

    async fn build(&self, trace_id: &str, request: &IntegrationRequest) {
        let timer = Timer::start();
        self.building.store(true, Ordering::SeqCst);
        self.event_bus.emit(Event::build_status(self.name(), IntegrationStatus::Building));
        info!("[{}] Starting integration of project '{}': {}", trace_id, self.name(), request);

        let status = tokio::select! {
            result = self.runner.run(trace_id, &self.project, request) => match result {
                Ok(output) => {
                    for (line_number, line) in output.logs.into_iter().enumerate() {
                        self.event_bus.emit(Event::log(self.name(), line, line_number));
                    }
                    output.status
                }
                Err(e) => {
                    error!("[{}] Integration of project '{}' failed: {:#}", trace_id, self.name(), e);
                    self.event_bus.emit(Event::error(Some(self.name()), format!("{:#}", e)));
                    IntegrationStatus::Exception
                }
            },
            _ = wait_for_abort(self.abort.subscribe()) => {
                warn!("[{}] Integration of project '{}' aborted", trace_id, self.name());
                IntegrationStatus::Cancelled
            }
        };

        let duration_ms = timer.elapsed_ms();
        *self.last_build.lock() = Some(BuildSummary {
            status,
            build_condition: request.build_condition().to_string(),
            source: request.source().to_string(),
            user_name: request.user_name().map(str::to_string),
            finished_at: self.clock.now().to_string(),
            duration_ms,
        });
        self.building.store(false, Ordering::SeqCst);

        info!(
            "[{}] Integration of project '{}' finished: {} ({:.2}ms)",
            trace_id, self.name(), status, duration_ms
        );
        self.event_bus.emit(Event::build_status(self.name(), status));
    }

    fn set_state(&self, state: IntegratorState) {
        self.state.send_replace(state);
        self.event_bus.emit(Event::integrator_state(self.name(), state));
    }
}

async fn wait_for_abort(mut abort: watch::Receiver<bool>) {
    let _ = abort.wait_for(|abort| *abort).await;
}

impl<EB: EventBus> IntegrationQueueNotifier for ProjectIntegrator<EB> {
    fn notify_entering_integration_queue(&self) {
        self.queued_items.fetch_add(1, Ordering::SeqCst);
        self.event_bus.emit(Event::queue_entered(self.name(), self.queue.name()));
    }

    fn notify_exiting_integration_queue(&self, is_pending_item_cancelled: bool) {
        let _ = self
            .queued_items
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1));
        if is_pending_item_cancelled {
            info!("Pending request for project '{}' removed from queue '{}'", self.name(), self.queue.name());
        }
        self.event_bus
            .emit(Event::queue_exited(self.name(), self.queue.name(), is_pending_item_cancelled));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::BroadcastEventBus;
    use crate::clock::ManualClock;
    use crate::queue::{IntegrationQueueSet, QueueConfiguration};
    use crate::testing::{wait_until, ScriptedRunner};
    use crate::triggers::IntervalTrigger;

    struct Fixture {
        set: IntegrationQueueSet,
        clock: Arc<ManualClock>,
        runner: Arc<ScriptedRunner>,
        bus: BroadcastEventBus,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                set: IntegrationQueueSet::new(),
                clock: Arc::new(ManualClock::at(2024, 4, 1, 12, 0)),
                runner: Arc::new(ScriptedRunner::new()),
                bus: BroadcastEventBus::new_default(Arc::new(BoundaryLogger::new())),
            }
        }

        fn deps(&self) -> IntegratorDeps<BroadcastEventBus> {
            IntegratorDeps {
                runner: self.runner.clone(),
                clock: self.clock.clone(),
                event_bus: self.bus.clone(),
                logger: Arc::new(BoundaryLogger::new()),
                poll_interval: Duration::from_millis(5),
            }
        }

        /// Integrator whose trigger never fires on its own during a test.
        fn integrator(&self, name: &str, queue: &str) -> Arc<ProjectIntegrator<BroadcastEventBus>> {
            let queue = self.set.add(QueueConfiguration::new(queue));
            let trigger = IntervalTrigger::new(self.clock.clone()).with_interval(3600);
            ProjectIntegrator::new(
                Arc::new(Project::new(name, queue.name(), 0)),
                queue,
                Box::new(trigger),
                self.deps(),
            )
        }
    }

    #[tokio::test]
    async fn test_force_build_runs_and_leaves_queue() {
        let fixture = Fixture::new();
        let integrator = fixture.integrator("web", "main");
        integrator.start();

        let outcome = integrator.force_build("alice", BTreeMap::new()).unwrap();
        assert_eq!(outcome, EnqueueOutcome::Added { index: 0 });

        wait_until(|| integrator.last_build().is_some()).await;
        wait_until(|| integrator.queue().is_empty()).await;

        let summary = integrator.last_build().unwrap();
        assert_eq!(summary.status, IntegrationStatus::Success);
        assert_eq!(summary.build_condition, "ForceBuild");
        assert_eq!(summary.user_name.as_deref(), Some("alice"));
        assert_eq!(fixture.runner.runs(), vec!["web"]);
        assert_eq!(integrator.activity(), ProjectActivity::Sleeping);

        integrator.stop();
        integrator.wait_for_exit().await;
        assert_eq!(integrator.state(), IntegratorState::Stopped);
    }

    #[tokio::test]
    async fn test_trigger_fire_enqueues_and_builds() {
        let fixture = Fixture::new();
        let integrator = fixture.integrator("api", "main");
        integrator.start();

        fixture.clock.advance(chrono::Duration::hours(2));
        wait_until(|| integrator.last_build().is_some()).await;

        let summary = integrator.last_build().unwrap();
        assert_eq!(summary.source, "IntervalTrigger");
        assert_eq!(summary.build_condition, "IfModificationExists");

        integrator.stop();
        integrator.wait_for_exit().await;
    }

    #[tokio::test]
    async fn test_failed_build_is_reported_on_bus() {
        let mut fixture = Fixture::new();
        fixture.runner = Arc::new(ScriptedRunner::new().with_status(IntegrationStatus::Failure));
        let mut events = fixture.bus.subscribe();
        let integrator = fixture.integrator("web", "main");
        integrator.start();

        integrator.force_build("alice", BTreeMap::new()).unwrap();
        wait_until(|| integrator.last_build().is_some()).await;
        integrator.stop();
        integrator.wait_for_exit().await;

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let Event::BuildStatus { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(statuses, vec![IntegrationStatus::Building, IntegrationStatus::Failure]);
    }

    #[tokio::test]
    async fn test_request_rejected_when_stopped() {
        let fixture = Fixture::new();
        let integrator = fixture.integrator("web", "main");

        let err = integrator.force_build("alice", BTreeMap::new()).unwrap_err();
        assert_eq!(err, QueueError::ProjectNotRunning("web".to_string()));
    }

    #[tokio::test]
    async fn test_abort_cancels_running_build_and_clears_queue() {
        let fixture = Fixture::new();
        fixture.runner.hold();
        let integrator = fixture.integrator("slow", "main");
        integrator.start();

        integrator.force_build("bob", BTreeMap::new()).unwrap();
        wait_until(|| integrator.activity() == ProjectActivity::Building).await;
        assert!(integrator.queue().is_in_use());

        integrator.abort();
        integrator.wait_for_exit().await;

        assert_eq!(integrator.last_build().unwrap().status, IntegrationStatus::Cancelled);
        assert!(integrator.queue().is_empty());
        assert!(!integrator.queue().is_in_use());
    }

    #[tokio::test]
    async fn test_projects_on_same_queue_build_one_at_a_time() {
        let fixture = Fixture::new();
        fixture.runner.hold();
        let first = fixture.integrator("first", "shared");
        let second = fixture.integrator("second", "shared");
        first.start();
        second.start();

        first.force_build("ci", BTreeMap::new()).unwrap();
        wait_until(|| first.activity() == ProjectActivity::Building).await;
        second.force_build("ci", BTreeMap::new()).unwrap();

        assert_eq!(second.activity(), ProjectActivity::Pending);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fixture.runner.runs(), vec!["first"]);

        fixture.runner.release();
        wait_until(|| second.last_build().is_some()).await;
        assert_eq!(fixture.runner.runs(), vec!["first", "second"]);

        first.stop();
        second.stop();
        first.wait_for_exit().await;
        second.wait_for_exit().await;
    }

    #[tokio::test]
    async fn test_lock_queue_stays_blocked_across_back_to_back_builds() {
        let fixture = Fixture::new();
        let main = fixture.set.add(QueueConfiguration::new("main").with_lock_queues("deploy"));
        let deploy = fixture.set.add(QueueConfiguration::new("deploy"));
        fixture.runner.hold_project("first");
        fixture.runner.hold_project("second");
        let first = fixture.integrator("first", "main");
        let second = fixture.integrator("second", "main");
        first.start();
        second.start();

        first.force_build("ci", BTreeMap::new()).unwrap();
        wait_until(|| first.activity() == ProjectActivity::Building).await;
        second.force_build("ci", BTreeMap::new()).unwrap();

        fixture.runner.release_project("first");
        wait_until(|| second.activity() == ProjectActivity::Building).await;
        assert!(main.is_in_use());
        assert!(deploy.is_blocked());
        assert!(deploy.try_lock().is_none());

        fixture.runner.release_project("second");
        wait_until(|| second.last_build().is_some()).await;
        wait_until(|| !main.is_in_use()).await;
        assert!(!deploy.is_blocked());

        first.stop();
        second.stop();
        first.wait_for_exit().await;
        second.wait_for_exit().await;
    }

    #[tokio::test]
    async fn test_cancel_pending_request() {
        let fixture = Fixture::new();
        fixture.runner.hold();
        let busy = fixture.integrator("busy", "shared");
        let waiting = fixture.integrator("waiting", "shared");
        busy.start();
        waiting.start();

        busy.force_build("ci", BTreeMap::new()).unwrap();
        wait_until(|| busy.activity() == ProjectActivity::Building).await;
        waiting.force_build("ci", BTreeMap::new()).unwrap();

        assert_eq!(waiting.cancel_pending_request(), 1);
        assert_eq!(waiting.activity(), ProjectActivity::Sleeping);
        assert_eq!(busy.queue().len(), 1);

        fixture.runner.release();
        busy.abort();
        waiting.abort();
        busy.wait_for_exit().await;
        waiting.wait_for_exit().await;
    }
}
