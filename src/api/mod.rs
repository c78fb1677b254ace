mod projects;
mod server;
pub mod middleware;

pub use middleware::TraceIdLayer;
pub use projects::projects_routes;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::QueueError;
use crate::queue::EnqueueOutcome;
use crate::state::AppContext;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .nest("/projects", projects_routes())
        .route("/snapshot", get(server::get_snapshot))
        .route("/abort", post(server::abort))
        .route("/restart", post(server::restart))
}

/// Full HTTP app: API routes, tracing and trace-id propagation.
pub fn router(context: AppContext) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TraceIdLayer)
        .with_state(context)
}

pub(crate) fn error_response(error: &QueueError) -> (StatusCode, Value) {
    let status = match error {
        QueueError::NoSuchProject(_) => StatusCode::NOT_FOUND,
        QueueError::ProjectNotRunning(_) => StatusCode::CONFLICT,
        e if e.is_configuration() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, json!({ "error": error.to_string() }))
}

pub(crate) fn outcome_json(project: &str, outcome: EnqueueOutcome) -> Value {
    match outcome {
        EnqueueOutcome::Added { index } => json!({ "project": project, "queued": true, "position": index }),
        EnqueueOutcome::Displaced { replaced_index, index } => json!({
            "project": project,
            "queued": true,
            "position": index,
            "replaced_position": replaced_index,
        }),
        EnqueueOutcome::Discarded => json!({ "project": project, "queued": false }),
    }
}
