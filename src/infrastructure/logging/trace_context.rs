use axum::http::HeaderMap;

/// Header carrying the trace id between callers, handlers and responses.
pub const TRACE_HEADER: &str = "x-trace-id";

/// Trace ID 생성 및 전파를 담당
///
/// - API 요청: 헤더의 trace id 재사용
/// - 프로젝트 워커: `worker-<project>-<uuid>`
/// - 서버 자체 작업(시작/종료): `system-<operation>-<uuid>`
pub struct TraceContext;

impl TraceContext {
    pub fn new_trace_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// 헤더에 비어있지 않은 trace id가 있으면 사용, 없으면 생성
    pub fn extract_or_generate(headers: &HeaderMap) -> String {
        headers
            .get(TRACE_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(Self::new_trace_id)
    }

    pub fn for_worker(project: &str) -> String {
        format!("worker-{}-{}", project, uuid::Uuid::new_v4())
    }

    pub fn system(operation: &str) -> String {
        format!("system-{}-{}", operation, uuid::Uuid::new_v4())
    }
}
