//! HTTP status API: ledger rows and scheduler state, read-only.

use std::sync::Arc;

use {
    axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        routing::get,
    },
    serde::Deserialize,
    tower_http::cors::CorsLayer,
};

use {vigil_ledger::TaskRunStore, vigil_scheduler::SchedulerEngine};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SchedulerEngine>,
    pub ledger: Arc<dyn TaskRunStore>,
}

/// Build the router with all routes and CORS.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/task-runs", get(list_task_runs))
        .route("/api/task-runs/{name}/{key}", get(get_task_run))
        .route("/api/scheduler/status", get(scheduler_status))
        .route("/api/scheduler/jobs", get(scheduler_jobs))
        .route("/api/scheduler/jobs/{job_id}/fires", get(job_fires))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.engine.status().await;
    Json(serde_json::json!({
        "service": "vigil",
        "version": env!("CARGO_PKG_VERSION"),
        "scheduler": status,
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

const DEFAULT_LIMIT: usize = 50;
/// Cap on caller-supplied `?limit=`; a huge value must not turn into an
/// unbounded scan.
const MAX_LIMIT: usize = 500;

fn effective_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

#[derive(Deserialize)]
struct TaskRunsQuery {
    name: Option<String>,
    limit: Option<usize>,
}

/// List ledger rows latest-first, optionally filtered by name.
async fn list_task_runs(
    State(state): State<AppState>,
    Query(query): Query<TaskRunsQuery>,
) -> impl IntoResponse {
    let limit = effective_limit(query.limit);
    match state.ledger.list(query.name.as_deref(), limit).await {
        Ok(runs) => Json(runs).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Look up one ledger row by (name, key).
async fn get_task_run(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.ledger.find(&name, &key).await {
        Ok(Some(run)) => Json(run).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "task run not found" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}


async fn scheduler_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.status().await)
}

async fn scheduler_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.jobs().await)
}

#[derive(Deserialize)]
struct FiresQuery {
    limit: Option<usize>,
}

/// Fire history for one trigger.
async fn job_fires(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<FiresQuery>,
) -> impl IntoResponse {
    let limit = effective_limit(query.limit);
    match state.engine.fires(&job_id, limit).await {
        Ok(fires) => Json(fires).into_response(),
        Err(vigil_scheduler::Error::JobNotFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "job not found" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
