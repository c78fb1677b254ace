use std::time::Instant;
use tracing::{debug, error, info};

/// BoundaryLogger - 모듈 경계에서 로깅을 담당
///
/// 로깅 포맷: [trace_id] [호출자→피호출자] [작업] [상태] [duration]
/// - API → QueueManager → ProjectIntegrator → IntegrationQueue
#[derive(Clone)]
pub struct BoundaryLogger;

impl BoundaryLogger {
    pub fn new() -> Self {
        Self
    }

    /// API 요청 시작
    /// 예: [API→Handler] POST /api/projects/web/force [ENTRY] enforcer=alice
    pub fn api_entry(&self, trace_id: &str, method: &str, path: &str, params: &str) {
        info!(
            trace_id = %trace_id,
            method = %method,
            path = %path,
            flow = "API→Handler",
            stage = "ENTRY",
            "[{}] [API→Handler] {} {} [ENTRY] {}",
            trace_id, method, path, params
        );
    }

    /// API 요청 완료
    pub fn api_exit(&self, trace_id: &str, method: &str, path: &str, duration_ms: f64, status: u16) {
        info!(
            trace_id = %trace_id,
            method = %method,
            path = %path,
            flow = "API→Handler",
            stage = "←DONE",
            duration_ms = %duration_ms,
            status = %status,
            "[{}] [API→Handler] {} {} [←DONE] {:.2}ms status={}",
            trace_id, method, path, duration_ms, status
        );
    }

    /// 퍼사드/서비스 호출 시작
    /// 예: [API→QueueManager] force_build [ENTRY] params="web"
    pub fn operation_entry<T: std::fmt::Debug>(&self, trace_id: &str, from: &str, to: &str, operation: &str, params: &T) {
        info!(
            trace_id = %trace_id,
            flow = format!("{}→{}", from, to),
            operation = %operation,
            stage = "ENTRY",
            params = ?params,
            "[{}] [{}→{}] {} [ENTRY] params={:?}",
            trace_id, from, to, operation, params
        );
    }

    /// 퍼사드/서비스 호출 완료
    pub fn operation_exit(&self, trace_id: &str, from: &str, to: &str, operation: &str, duration_ms: f64) {
        info!(
            trace_id = %trace_id,
            flow = format!("{}→{}", from, to),
            operation = %operation,
            stage = "←DONE",
            duration_ms = %duration_ms,
            "[{}] [{}→{}] {} [←DONE] {:.2}ms",
            trace_id, from, to, operation, duration_ms
        );
    }

    /// 퍼사드/서비스 에러
    pub fn operation_error<E: std::fmt::Display>(&self, trace_id: &str, from: &str, to: &str, operation: &str, error: &E) {
        error!(
            trace_id = %trace_id,
            flow = format!("{}→{}", from, to),
            operation = %operation,
            stage = "←FAIL",
            error = %error,
            "[{}] [{}→{}] {} [←FAIL] error={}",
            trace_id, from, to, operation, error
        );
    }

    /// 큐 상태 전이
    /// 예: [Integrator→Queue] main [LOCK] project=web
    pub fn queue_transition(&self, trace_id: &str, queue: &str, project: &str, stage: &str) {
        debug!(
            trace_id = %trace_id,
            queue = %queue,
            project = %project,
            flow = "Integrator→Queue",
            stage = %stage,
            "[{}] [Integrator→Queue] {} [{}] project={}",
            trace_id, queue, stage, project
        );
    }

    /// 이벤트 발행
    /// 예: [web→EventBus] emit [EVT↗] QueueEntered
    pub fn event_emit(&self, from: &str, event_type: &str) {
        debug!(
            from = %from,
            event_type = %event_type,
            flow = format!("{}→EventBus", from),
            stage = "EVT↗",
            "[{}→EventBus] emit [EVT↗] {}",
            from, event_type
        );
    }
}

impl Default for BoundaryLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// 성능 측정용 타이머
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// 경과 시간 (밀리초)
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
