use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::warn;

use super::{error_response, outcome_json};
use crate::infrastructure::logging::{TraceContext, Timer};
use crate::queue::BuildCondition;
use crate::state::AppContext;

pub fn projects_routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(list_projects))
        .route("/{name}/start", post(start_project))
        .route("/{name}/stop", post(stop_project))
        .route("/{name}/force", post(force_build))
        .route("/{name}/request", post(request_build))
        .route("/{name}/cancel", post(cancel_pending_request))
}

/// Parse an optional JSON body; an empty body means all defaults.
fn parse_body<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> Result<T, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| format!("Invalid request body: {}", e))
}

async fn list_projects(State(ctx): State<AppContext>, headers: HeaderMap) -> impl IntoResponse {
    let trace_id = TraceContext::extract_or_generate(&headers);
    let timer = Timer::start();

    ctx.logger.api_entry(&trace_id, "GET", "/api/projects", "");
    let statuses = ctx.manager.get_project_statuses();
    ctx.logger.api_exit(&trace_id, "GET", "/api/projects", timer.elapsed_ms(), 200);

    (StatusCode::OK, Json(statuses))
}

async fn start_project(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let trace_id = TraceContext::extract_or_generate(&headers);
    let timer = Timer::start();
    let path = format!("/api/projects/{}/start", name);

    ctx.logger.api_entry(&trace_id, "POST", &path, "");
    let (status, body) = match ctx.manager.start(&trace_id, &name) {
        Ok(()) => (StatusCode::OK, json!({ "project": name, "started": true })),
        Err(e) => error_response(&e),
    };
    ctx.logger.api_exit(&trace_id, "POST", &path, timer.elapsed_ms(), status.as_u16());

    (status, Json(body))
}

async fn stop_project(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let trace_id = TraceContext::extract_or_generate(&headers);
    let timer = Timer::start();
    let path = format!("/api/projects/{}/stop", name);

    ctx.logger.api_entry(&trace_id, "POST", &path, "");
    let (status, body) = match ctx.manager.stop(&trace_id, &name) {
        Ok(()) => (StatusCode::OK, json!({ "project": name, "stopping": true })),
        Err(e) => error_response(&e),
    };
    ctx.logger.api_exit(&trace_id, "POST", &path, timer.elapsed_ms(), status.as_u16());

    (status, Json(body))
}

#[derive(Debug, Default, Deserialize)]
struct ForceBuildBody {
    enforcer: Option<String>,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

async fn force_build(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let trace_id = TraceContext::extract_or_generate(&headers);
    let timer = Timer::start();
    let path = format!("/api/projects/{}/force", name);

    let (status, body) = match parse_body::<ForceBuildBody>(&body) {
        Ok(request) => {
            let enforcer = request.enforcer.unwrap_or_else(|| "api".to_string());
            ctx.logger.api_entry(&trace_id, "POST", &path, &format!("enforcer={}", enforcer));
            match ctx.manager.force_build(&trace_id, &name, &enforcer, request.parameters) {
                Ok(outcome) => (StatusCode::ACCEPTED, outcome_json(&name, outcome)),
                Err(e) => error_response(&e),
            }
        }
        Err(message) => {
            ctx.logger.api_entry(&trace_id, "POST", &path, "");
            warn!("[{}] {}", trace_id, message);
            (StatusCode::BAD_REQUEST, json!({ "error": message }))
        }
    };
    ctx.logger.api_exit(&trace_id, "POST", &path, timer.elapsed_ms(), status.as_u16());

    (status, Json(body))
}

#[derive(Debug, Default, Deserialize)]
struct RequestBuildBody {
    build_condition: Option<BuildCondition>,
    source: Option<String>,
    user_name: Option<String>,
}

async fn request_build(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let trace_id = TraceContext::extract_or_generate(&headers);
    let timer = Timer::start();
    let path = format!("/api/projects/{}/request", name);

    ctx.logger.api_entry(&trace_id, "POST", &path, "");
    let (status, body) = match parse_body::<RequestBuildBody>(&body) {
        Ok(body) => {
            let request = ctx.manager.build_request(
                body.build_condition.unwrap_or_default(),
                body.source.as_deref().unwrap_or("api"),
                body.user_name,
            );
            match ctx.manager.request(&trace_id, &name, request) {
                Ok(outcome) => (StatusCode::ACCEPTED, outcome_json(&name, outcome)),
                Err(e) => error_response(&e),
            }
        }
        Err(message) => {
            warn!("[{}] {}", trace_id, message);
            (StatusCode::BAD_REQUEST, json!({ "error": message }))
        }
    };
    ctx.logger.api_exit(&trace_id, "POST", &path, timer.elapsed_ms(), status.as_u16());

    (status, Json(body))
}

async fn cancel_pending_request(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let trace_id = TraceContext::extract_or_generate(&headers);
    let timer = Timer::start();
    let path = format!("/api/projects/{}/cancel", name);

    ctx.logger.api_entry(&trace_id, "POST", &path, "");
    let (status, body) = match ctx.manager.cancel_pending_request(&trace_id, &name) {
        Ok(removed) => (StatusCode::OK, json!({ "project": name, "removed": removed })),
        Err(e) => error_response(&e),
    };
    ctx.logger.api_exit(&trace_id, "POST", &path, timer.elapsed_ms(), status.as_u16());

    (status, Json(body))
}
