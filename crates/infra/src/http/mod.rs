//! HTTP surface: three route groups served on distinct ports
//! (deployer, vLLM management, evaluation), all thin shells over the app
//! layer and the api crate's DTOs.

mod deployer;
mod error;
mod eval;
mod projects;
mod terminal_ws;
mod vllm;

pub use error::ApiError;

use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post, put};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Routes served by the benchmark deployer listener.
pub fn deployer_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/projects", post(projects::create_project).get(projects::list_projects))
        .route(
            "/projects/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/projects/{id}/sync", post(projects::force_sync))
        .route("/projects/{id}/files", get(projects::list_files))
        .route("/files/{id}", get(projects::get_file).delete(projects::delete_file))
        .route(
            "/projects/{id}/modified-files",
            post(projects::create_modified_file).get(projects::list_modified_files),
        )
        .route(
            "/modified-files/{id}",
            get(projects::get_modified_file)
                .put(projects::update_modified_file)
                .delete(projects::delete_modified_file),
        )
        .route("/projects/{id}/reset", post(projects::reset_project))
        .route("/deploy", post(deployer::deploy))
        .route("/delete", post(deployer::delete_by_yaml))
        .route("/deployments", get(deployer::list_deployments))
        .route("/deployments/{id}", get(deployer::get_deployment))
        .route("/jobs/{name}/status", get(deployer::job_status))
        .route("/jobs/{name}/logs", get(deployer::job_logs))
        .route("/jobs/{name}/terminal", post(deployer::create_terminal))
        .route("/terminal/{session_id}", get(terminal_ws::terminal_socket))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes served by the vLLM management listener.
pub fn vllm_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/deploy", post(vllm::deploy))
        .route("/deployments", get(vllm::list_deployments))
        .route("/deployments/{id}", delete(vllm::delete_deployment).get(vllm::get_deployment))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes served by the evaluation listener.
pub fn eval_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/evaluate", post(eval::evaluate))
        .route("/run", post(eval::run))
        .route("/tasks", get(eval::list_tasks))
        .route("/tasks/{id}", get(eval::get_task))
        .route("/tasks/{id}/cancel", put(eval::cancel_task))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 200 iff the database answers a ping.
async fn health(
    state: axum::extract::State<Arc<AppState>>,
) -> Result<axum::Json<benchkube_api::v1::HealthDto>, ApiError> {
    state.health.ping().await?;
    Ok(axum::Json(benchkube_api::v1::HealthDto {
        status: "ok".to_string(),
    }))
}
