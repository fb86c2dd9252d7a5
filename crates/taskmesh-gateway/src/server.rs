use crate::handlers;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use taskmesh_executor::WorkflowExecutor;
use taskmesh_planner::ExecutionPlanner;
use taskmesh_registry::{Dispatch, HealthMonitor, WorkerRegistry};

/// Shared application state injected into every handler.
pub struct AppState {
    pub registry: Arc<WorkerRegistry>,
    pub dispatcher: Arc<dyn Dispatch>,
    pub planner: Arc<ExecutionPlanner>,
    pub executor: Arc<WorkflowExecutor>,
    pub health: Arc<HealthMonitor>,
}

/// The orchestration gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router over the injected state.
    pub fn build(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/capabilities", get(handlers::capabilities))
            .route(
                "/tasks/{capability}/execute",
                post(handlers::execute_task),
            )
            .route(
                "/workflows/{workflow_id}/plan",
                post(handlers::plan_workflow),
            )
            .route(
                "/workflows/{workflow_id}/execute",
                post(handlers::execute_workflow),
            )
            .with_state(state)
    }
}
