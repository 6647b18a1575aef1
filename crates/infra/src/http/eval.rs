//! Evaluation surface: delayed scheduling and direct runs.

use crate::http::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use benchkube_api::v1::{
    EvaluateRequest, EvaluateResponse, RunResponse, TaskDto, task_to_dto,
};
use benchkube_app::{SubmissionSpec, cancel_evaluation, run_now, schedule_evaluation};
use benchkube_domain::{FileId, ModifiedFileId, Namespace, ProjectId, TaskId, TaskState};
use benchkube_shared::{RequestContext, Result};
use std::sync::Arc;

fn submission_spec(request: &EvaluateRequest) -> Result<SubmissionSpec> {
    let namespace = match request.namespace.as_deref() {
        Some(raw) => Some(Namespace::parse(raw)?),
        None => None,
    };
    Ok(SubmissionSpec {
        project_id: ProjectId::parse(&request.project_id)?,
        benchmark_type: request.benchmark_type.as_deref().map(Into::into),
        job_file_id: FileId::parse(&request.job_file_id)?,
        config_file_id: request
            .config_file_id
            .as_deref()
            .map(FileId::parse)
            .transpose()?,
        job_override_id: request
            .job_override_id
            .as_deref()
            .map(ModifiedFileId::parse)
            .transpose()?,
        model_endpoint: request.vllm_model_endpoint.as_deref().map(Into::into),
        name: request.name.as_deref().map(Into::into),
        namespace,
    })
}

pub(crate) async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EvaluateRequest>,
) -> Result<(StatusCode, Json<EvaluateResponse>), ApiError> {
    let ctx = RequestContext::new_request();
    let spec = submission_spec(&request)?;
    let task = schedule_evaluation(&ctx, &state.evaluation_deps(), spec).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EvaluateResponse {
            task_id: task.task_id.as_str().to_owned(),
            scheduled_at_ms: task.scheduled_at_ms,
        }),
    ))
}

pub(crate) async fn run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EvaluateRequest>,
) -> Result<(StatusCode, Json<RunResponse>), ApiError> {
    let ctx = RequestContext::new_request();
    let spec = submission_spec(&request)?;
    let deployment_id = run_now(&ctx, &state.evaluation_deps(), spec).await?;
    Ok((
        StatusCode::CREATED,
        Json(RunResponse {
            deployment_id: deployment_id.as_str().to_owned(),
        }),
    ))
}

pub(crate) async fn list_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TaskDto>>, ApiError> {
    let ctx = RequestContext::new_request();
    let tasks = state.task_store.list(&ctx, None::<TaskState>).await?;
    Ok(Json(tasks.iter().map(task_to_dto).collect()))
}

pub(crate) async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskDto>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = TaskId::parse(&id)?;
    let task = state.task_store.get(&ctx, &id).await?;
    Ok(Json(task_to_dto(&task)))
}

pub(crate) async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskDto>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = TaskId::parse(&id)?;
    cancel_evaluation(&ctx, &state.evaluation_deps(), &id).await?;
    let task = state.task_store.get(&ctx, &id).await?;
    Ok(Json(task_to_dto(&task)))
}
