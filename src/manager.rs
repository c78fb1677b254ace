use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::events::{Event, EventBus};
use crate::application::ports::BuildRunner;
use crate::build::{IntegratorDeps, ProjectIntegrator};
use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::error::{QueueError, QueueResult};
use crate::infrastructure::logging::{BoundaryLogger, Timer};
use crate::models::ProjectStatus;
use crate::queue::{
    BuildCondition, EnqueueOutcome, IntegrationQueueSet, IntegrationRequest, QueueConfiguration, QueueSnapshot,
};

/// Everything built from one configuration load.
///
/// Replaced wholesale on restart; the queue set must outlive its queues'
/// integrators, so both live here together.
struct Farm<EB: EventBus> {
    queue_set: IntegrationQueueSet,
    integrators: BTreeMap<String, Arc<ProjectIntegrator<EB>>>,
    load_errors: Vec<QueueError>,
}

impl<EB: EventBus> Farm<EB> {
    fn build(config: &ServerConfig, deps: IntegratorDeps<EB>) -> Self {
        let queue_set = IntegrationQueueSet::new();
        for configuration in config.queue_configurations() {
            queue_set.add(configuration);
        }

        let mut integrators = BTreeMap::new();
        let mut load_errors = Vec::new();

        for project_config in &config.projects {
            if integrators.contains_key(&project_config.name) {
                let error = QueueError::configuration(format!("Duplicate project name: {}", project_config.name));
                warn!("Skipping project '{}': {}", project_config.name, error);
                load_errors.push(error);
                continue;
            }

            let trigger = match project_config.build_trigger(&deps.clock) {
                Ok(trigger) => trigger,
                Err(error) => {
                    warn!("Skipping project '{}': {}", project_config.name, error);
                    load_errors.push(error);
                    continue;
                }
            };

            let queue_name = project_config.queue_name();
            let queue = queue_set
                .get(queue_name)
                .unwrap_or_else(|| queue_set.add(QueueConfiguration::new(queue_name)));

            let integrator = ProjectIntegrator::new(
                Arc::new(project_config.to_project()),
                queue,
                trigger,
                deps.clone(),
            );
            integrators.insert(project_config.name.clone(), integrator);
        }

        Self {
            queue_set,
            integrators,
            load_errors,
        }
    }
}

/// Whole-server view served to callers.
#[derive(Debug, Clone, Serialize)]
pub struct CruiseServerSnapshot {
    pub projects: Vec<ProjectStatus>,
    pub queues: Vec<QueueSnapshot>,
}

/// QueueManager - 프로젝트/큐 생명주기 퍼사드
///
/// 책임:
/// - 설정으로부터 큐 집합과 프로젝트 통합기(integrator) 생성
/// - 프로젝트 시작/중지/강제 빌드/요청/취소
/// - 재시작 시 큐 집합 전체 교체
/// - 스냅샷 및 상태 조회
pub struct QueueManager<EB: EventBus> {
    farm: RwLock<Arc<Farm<EB>>>,
    /// Projects to bring back up after a restart.
    resume: Mutex<Option<BTreeSet<String>>>,
    runner: Arc<dyn BuildRunner>,
    clock: Arc<dyn Clock>,
    event_bus: EB,
    logger: Arc<BoundaryLogger>,
}

impl<EB: EventBus> QueueManager<EB> {
    pub fn new(
        config: &ServerConfig,
        runner: Arc<dyn BuildRunner>,
        clock: Arc<dyn Clock>,
        event_bus: EB,
        logger: Arc<BoundaryLogger>,
    ) -> Self {
        let manager = Self {
            farm: RwLock::new(Arc::new(Farm {
                queue_set: IntegrationQueueSet::new(),
                integrators: BTreeMap::new(),
                load_errors: Vec::new(),
            })),
            resume: Mutex::new(None),
            runner,
            clock,
            event_bus,
            logger,
        };
        manager.load(config);
        manager
    }

    fn deps(&self, config: &ServerConfig) -> IntegratorDeps<EB> {
        IntegratorDeps {
            runner: Arc::clone(&self.runner),
            clock: Arc::clone(&self.clock),
            event_bus: self.event_bus.clone(),
            logger: Arc::clone(&self.logger),
            poll_interval: config.poll_interval(),
        }
    }

    /// Swap in a farm built from `config`. Returns the previous one.
    fn load(&self, config: &ServerConfig) -> Arc<Farm<EB>> {
        let farm = Farm::build(config, self.deps(config));
        for error in &farm.load_errors {
            self.event_bus.emit(Event::error(None, error.to_string()));
        }
        if farm.queue_set.is_empty() {
            warn!("No projects configured; the server will sit idle");
        }
        info!(
            "Loaded {} projects on {} queues ({} configuration errors)",
            farm.integrators.len(),
            farm.queue_set.len(),
            farm.load_errors.len()
        );
        std::mem::replace(&mut *self.farm.write(), Arc::new(farm))
    }

    fn farm(&self) -> Arc<Farm<EB>> {
        Arc::clone(&self.farm.read())
    }

    fn integrators(&self) -> Vec<Arc<ProjectIntegrator<EB>>> {
        self.farm().integrators.values().cloned().collect()
    }

    /// Run a synchronous facade operation between boundary log records.
    fn traced<P: Debug, T>(
        &self,
        trace_id: &str,
        operation: &str,
        params: &P,
        f: impl FnOnce() -> QueueResult<T>,
    ) -> QueueResult<T> {
        let timer = Timer::start();
        self.logger.operation_entry(trace_id, "API", "QueueManager", operation, params);
        let result = f();
        match &result {
            Ok(_) => self.logger.operation_exit(trace_id, "API", "QueueManager", operation, timer.elapsed_ms()),
            Err(e) => self.logger.operation_error(trace_id, "API", "QueueManager", operation, e),
        }
        result
    }

    pub fn load_errors(&self) -> Vec<QueueError> {
        self.farm().load_errors.clone()
    }

    pub fn get_integrator(&self, project_name: &str) -> QueueResult<Arc<ProjectIntegrator<EB>>> {
        self.farm()
            .integrators
            .get(project_name)
            .cloned()
            .ok_or_else(|| QueueError::NoSuchProject(project_name.to_string()))
    }

    pub fn start_all_projects(&self, trace_id: &str) {
        let timer = Timer::start();
        self.logger.operation_entry(trace_id, "Server", "QueueManager", "start_all_projects", &());

        let resume = self.resume.lock().take();
        for integrator in self.integrators() {
            let should_start = resume
                .as_ref()
                .map_or(true, |names| names.contains(integrator.name()));
            if should_start {
                integrator.start();
            } else {
                info!("[{}] Project '{}' was stopped before restart, leaving it stopped", trace_id, integrator.name());
            }
        }

        self.logger
            .operation_exit(trace_id, "Server", "QueueManager", "start_all_projects", timer.elapsed_ms());
    }

    /// Stop every project and wait for the workers to exit.
    ///
    /// When `restarting`, the projects that were running are remembered so
    /// the next `start_all_projects` only brings those back.
    pub async fn stop_all_projects(&self, trace_id: &str, restarting: bool) {
        let timer = Timer::start();
        self.logger
            .operation_entry(trace_id, "Server", "QueueManager", "stop_all_projects", &restarting);

        let integrators = self.integrators();
        if restarting {
            let running: BTreeSet<String> = integrators
                .iter()
                .filter(|integrator| integrator.is_running())
                .map(|integrator| integrator.name().to_string())
                .collect();
            *self.resume.lock() = Some(running);
        }

        for integrator in &integrators {
            integrator.stop();
        }
        join_all(integrators.iter().map(|integrator| integrator.wait_for_exit())).await;

        self.logger
            .operation_exit(trace_id, "Server", "QueueManager", "stop_all_projects", timer.elapsed_ms());
    }

    /// Stop every project, cancelling builds in progress.
    pub async fn abort(&self, trace_id: &str) {
        let timer = Timer::start();
        self.logger.operation_entry(trace_id, "API", "QueueManager", "abort", &());

        let integrators = self.integrators();
        for integrator in &integrators {
            integrator.abort();
        }
        join_all(integrators.iter().map(|integrator| integrator.wait_for_exit())).await;

        self.logger.operation_exit(trace_id, "API", "QueueManager", "abort", timer.elapsed_ms());
    }

    /// Stop everything, rebuild queues and integrators from `config`, and
    /// start the projects that were running plus any new ones.
    pub async fn restart(&self, trace_id: &str, config: &ServerConfig) -> Vec<QueueError> {
        let timer = Timer::start();
        self.logger.operation_entry(trace_id, "API", "QueueManager", "restart", &config.projects.len());

        self.stop_all_projects(trace_id, true).await;
        let previous = self.load(config);

        {
            let mut resume = self.resume.lock();
            if let Some(names) = resume.as_mut() {
                let farm = self.farm();
                for name in farm.integrators.keys() {
                    if !previous.integrators.contains_key(name) {
                        names.insert(name.clone());
                    }
                }
            }
        }
        self.start_all_projects(trace_id);

        let errors = self.load_errors();
        self.logger.operation_exit(trace_id, "API", "QueueManager", "restart", timer.elapsed_ms());
        errors
    }

    pub fn start(&self, trace_id: &str, project_name: &str) -> QueueResult<()> {
        self.traced(trace_id, "start", &project_name, || {
            self.get_integrator(project_name)?.start();
            Ok(())
        })
    }

    pub fn stop(&self, trace_id: &str, project_name: &str) -> QueueResult<()> {
        self.traced(trace_id, "stop", &project_name, || {
            self.get_integrator(project_name)?.stop();
            Ok(())
        })
    }

    pub fn force_build(
        &self,
        trace_id: &str,
        project_name: &str,
        enforcer: &str,
        parameters: BTreeMap<String, String>,
    ) -> QueueResult<EnqueueOutcome> {
        self.traced(trace_id, "force_build", &(project_name, enforcer), || {
            self.get_integrator(project_name)?.force_build(enforcer, parameters)
        })
    }

    pub fn request(
        &self,
        trace_id: &str,
        project_name: &str,
        request: IntegrationRequest,
    ) -> QueueResult<EnqueueOutcome> {
        self.traced(trace_id, "request", &(project_name, request.build_condition()), || {
            self.get_integrator(project_name)?.request(request)
        })
    }

    pub fn cancel_pending_request(&self, trace_id: &str, project_name: &str) -> QueueResult<usize> {
        self.traced(trace_id, "cancel_pending_request", &project_name, || {
            Ok(self.get_integrator(project_name)?.cancel_pending_request())
        })
    }

    pub async fn wait_for_exit(&self, trace_id: &str, project_name: &str) -> QueueResult<()> {
        let integrator = self.traced(trace_id, "wait_for_exit", &project_name, || {
            self.get_integrator(project_name)
        })?;
        integrator.wait_for_exit().await;
        Ok(())
    }

    pub fn get_project_statuses(&self) -> Vec<ProjectStatus> {
        self.integrators().iter().map(|integrator| integrator.status()).collect()
    }

    pub fn get_cruise_server_snapshot(&self) -> CruiseServerSnapshot {
        let farm = self.farm();
        CruiseServerSnapshot {
            projects: farm.integrators.values().map(|integrator| integrator.status()).collect(),
            queues: farm.queue_set.snapshot().queues,
        }
    }

    /// Request stamped with the manager's clock.
    pub fn build_request(&self, condition: BuildCondition, source: &str, user_name: Option<String>) -> IntegrationRequest {
        IntegrationRequest::new(condition, source, user_name, self.clock.now())
    }
}
