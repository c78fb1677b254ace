use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::infrastructure::logging::{TraceContext, Timer};
use crate::state::AppContext;

pub async fn get_snapshot(State(ctx): State<AppContext>, headers: HeaderMap) -> impl IntoResponse {
    let trace_id = TraceContext::extract_or_generate(&headers);
    let timer = Timer::start();

    ctx.logger.api_entry(&trace_id, "GET", "/api/snapshot", "");
    let snapshot = ctx.manager.get_cruise_server_snapshot();
    ctx.logger.api_exit(&trace_id, "GET", "/api/snapshot", timer.elapsed_ms(), 200);

    (StatusCode::OK, Json(snapshot))
}

/// Stop every project, cancelling running builds
pub async fn abort(State(ctx): State<AppContext>, headers: HeaderMap) -> impl IntoResponse {
    let trace_id = TraceContext::extract_or_generate(&headers);
    let timer = Timer::start();

    ctx.logger.api_entry(&trace_id, "POST", "/api/abort", "");
    ctx.manager.abort(&trace_id).await;
    ctx.logger.api_exit(&trace_id, "POST", "/api/abort", timer.elapsed_ms(), 200);

    (StatusCode::OK, Json(json!({ "aborted": true })))
}

/// Reload the configuration file and rebuild every queue
pub async fn restart(State(ctx): State<AppContext>, headers: HeaderMap) -> impl IntoResponse {
    let trace_id = TraceContext::extract_or_generate(&headers);
    let timer = Timer::start();
    let path = ctx.settings.config_path.clone();

    ctx.logger.api_entry(&trace_id, "POST", "/api/restart", &format!("config={}", path.display()));

    let (status, body) = match ServerConfig::load(&path) {
        Ok(config) => {
            let errors = ctx.manager.restart(&trace_id, &config).await;
            info!("[{}] Restarted with {} configuration errors", trace_id, errors.len());
            let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
            (StatusCode::OK, json!({ "restarted": true, "errors": errors }))
        }
        Err(e) => {
            error!("[{}] Failed to reload configuration: {:#}", trace_id, e);
            (StatusCode::BAD_REQUEST, json!({ "error": format!("{:#}", e) }))
        }
    };
    ctx.logger.api_exit(&trace_id, "POST", "/api/restart", timer.elapsed_ms(), status.as_u16());

    (status, Json(body))
}
