use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use taskmesh_core::{MeshError, Priority};
use taskmesh_executor::ExecutionMode;
use taskmesh_planner::{OptimizationLevel, PlanConstraints};
use tracing::warn;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Map an error onto the HTTP taxonomy and the uniform failure envelope.
fn error_response(err: &MeshError) -> (StatusCode, Json<Value>) {
    let status = match err {
        MeshError::Validation(_) | MeshError::Serialization(_) => StatusCode::BAD_REQUEST,
        MeshError::NotFound(_) => StatusCode::NOT_FOUND,
        MeshError::Unavailable(_) | MeshError::Timeout(_) | MeshError::Transport(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        MeshError::Config(_) | MeshError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "success": false,
            "error": err.kind(),
            "message": err.to_string(),
        })),
    )
}

fn default_parameters() -> Value {
    json!({})
}

/// Aggregate health. Never fails; reflects the health loop's last cycle.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.health.snapshot().await;
    Json(json!({
        "status": if snapshot.healthy { "ok" } else { "degraded" },
        "service": "taskmesh",
        "active_workers": snapshot.active_workers,
        "total_workers": snapshot.total_workers,
        "active_fraction": snapshot.active_fraction,
    }))
}

/// Registry snapshot with per-worker rolling stats.
pub async fn capabilities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let workers = state.registry.snapshot().await;
    Json(json!({ "workers": workers }))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteTaskRequest {
    pub task: String,
    #[serde(default = "default_parameters")]
    pub parameters: Value,
    #[serde(default)]
    pub priority: Priority,
    pub timeout_ms: Option<u64>,
}

/// Direct single dispatch to one worker, bypassing workflow planning.
pub async fn execute_task(
    State(state): State<Arc<AppState>>,
    Path(capability): Path<String>,
    Json(request): Json<ExecuteTaskRequest>,
) -> impl IntoResponse {
    let timeout = Duration::from_millis(request.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
    let payload = json!({
        "task": request.task,
        "parameters": request.parameters,
        "priority": request.priority,
    });

    match state.dispatcher.dispatch(&capability, payload, timeout).await {
        Ok(record) => {
            let body = json!({
                "success": record.success,
                "result": record.payload,
                "error": record.error,
                "duration_ms": record.duration_ms,
            });
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            warn!(capability = %capability, error = %e, "Task dispatch rejected");
            error_response(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    #[serde(default = "default_parameters")]
    pub parameters: Value,
    #[serde(default)]
    pub constraints: PlanConstraints,
    #[serde(default)]
    pub optimization_level: OptimizationLevel,
}

/// Compute (or fetch from cache) the execution plan for a workflow.
pub async fn plan_workflow(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    Json(request): Json<PlanRequest>,
) -> impl IntoResponse {
    match state
        .planner
        .plan(
            &workflow_id,
            &request.parameters,
            &request.constraints,
            request.optimization_level,
        )
        .await
    {
        Ok(plan) => match serde_json::to_value(&plan) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => error_response(&MeshError::from(e)),
        },
        Err(e) => {
            warn!(workflow_id = %workflow_id, error = %e, "Planning failed");
            error_response(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecuteWorkflowRequest {
    #[serde(default = "default_parameters")]
    pub parameters: Value,
    #[serde(default)]
    pub mode: ExecutionMode,
    pub timeout_ms: Option<u64>,
}

/// Run a workflow. Partial failure still answers 200: callers must inspect
/// `status` and `success_rate`.
pub async fn execute_workflow(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    Json(request): Json<ExecuteWorkflowRequest>,
) -> impl IntoResponse {
    let timeout = Duration::from_millis(request.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
    match state
        .executor
        .run(&workflow_id, &request.parameters, request.mode, timeout)
        .await
    {
        Ok(result) => match serde_json::to_value(&result) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => error_response(&MeshError::from(e)),
        },
        Err(e) => {
            warn!(workflow_id = %workflow_id, error = %e, "Workflow run rejected");
            error_response(&e)
        }
    }
}
