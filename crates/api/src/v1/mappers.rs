//! API v1 DTO mapping helpers.

use crate::v1::types::{
    DeploymentDto, ErrorBodyDto, FileDto, ModifiedFileDto, PollOutcomeDto, ProjectDto, TaskDto,
    VllmDeploymentDto,
};
use benchkube_domain::{Deployment, EvaluationTask, ModifiedFile, Project, SourceFile, VllmDeployment};
use benchkube_shared::{ErrorCode, ErrorEnvelope, is_secret_key};
use std::collections::BTreeMap;

/// Map the error taxonomy onto an HTTP status code.
///
/// NotFound -> 404, Conflict -> 409, Invalid -> 400, Unauthorized -> 401,
/// Upstream/Transient/Timeout -> 503, everything else -> 500.
#[must_use]
pub fn http_status_for(error: &ErrorEnvelope) -> u16 {
    if error.code == ErrorCode::not_found() {
        404
    } else if error.code == ErrorCode::conflict() {
        409
    } else if error.code == ErrorCode::invalid() {
        400
    } else if error.code == ErrorCode::unauthorized() {
        401
    } else if error.code == ErrorCode::upstream()
        || error.code == ErrorCode::transient()
        || error.code == ErrorCode::timeout()
    {
        503
    } else {
        500
    }
}

/// Map an error envelope into the wire error body, secrets redacted.
#[must_use]
pub fn error_body(error: &ErrorEnvelope) -> ErrorBodyDto {
    let meta: BTreeMap<String, String> = error
        .metadata
        .iter()
        .map(|(key, value)| {
            let shown = if is_secret_key(key) {
                benchkube_shared::REDACTED.to_string()
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect();

    ErrorBodyDto {
        code: format!(
            "ERR_{}_{}",
            sanitize_segment(error.code.namespace()),
            sanitize_segment(error.code.code())
        ),
        detail: error.message.clone(),
        meta: if meta.is_empty() { None } else { Some(meta) },
    }
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Map a project into its DTO.
#[must_use]
pub fn project_to_dto(project: &Project) -> ProjectDto {
    ProjectDto {
        id: project.id.as_str().to_owned(),
        name: project.name.to_string(),
        owner: project.owner.to_string(),
        repository: project.repository.to_string(),
        reference: project.reference.to_string(),
        config_folder: project.config_folder.to_string(),
        job_folder: project.job_folder.to_string(),
        poll_interval_seconds: project.poll_interval_ms / 1000,
        created_at_ms: project.created_at_ms,
        updated_at_ms: project.updated_at_ms,
        last_poll: project.last_poll.as_ref().map(|outcome| PollOutcomeDto {
            finished_at_ms: outcome.finished_at_ms,
            files_seen: outcome.files_seen,
            files_changed: outcome.files_changed,
            consecutive_failures: outcome.consecutive_failures,
            error: outcome.error.as_ref().map(ToString::to_string),
        }),
    }
}

/// Map a source file into its DTO.
///
/// `last_successful_poll_ms` drives the stale flag; `include_content`
/// attaches the UTF-8 content on single-file reads.
#[must_use]
pub fn file_to_dto(
    file: &SourceFile,
    last_successful_poll_ms: u64,
    include_content: bool,
) -> FileDto {
    FileDto {
        id: file.id.as_str().to_owned(),
        project_id: file.project_id.as_str().to_owned(),
        path: file.path.to_string(),
        name: file.name.to_string(),
        file_type: file.file_type.as_str().to_owned(),
        benchmark_type: file.benchmark_type.to_string(),
        source_commit: file.source_commit.to_string(),
        last_observed_at_ms: file.last_observed_at_ms,
        orphaned: file.orphaned,
        stale: file.is_stale_at(last_successful_poll_ms),
        content: include_content
            .then(|| String::from_utf8_lossy(&file.content).into_owned()),
    }
}

/// Map an override into its DTO.
#[must_use]
pub fn modified_file_to_dto(modified: &ModifiedFile, include_content: bool) -> ModifiedFileDto {
    ModifiedFileDto {
        id: modified.id.as_str().to_owned(),
        original_file_id: modified.original_file_id.as_str().to_owned(),
        modified_name: modified.modified_name.to_string(),
        content: include_content
            .then(|| String::from_utf8_lossy(&modified.content).into_owned()),
        created_at_ms: modified.created_at_ms,
        updated_at_ms: modified.updated_at_ms,
        orphaned: modified.orphaned,
    }
}

/// Map a tracked deployment into its DTO.
#[must_use]
pub fn deployment_to_dto(deployment: &Deployment) -> DeploymentDto {
    DeploymentDto {
        deployment_id: deployment.deployment_id.as_str().to_owned(),
        namespace: deployment.namespace.as_str().to_owned(),
        primary_resource_type: deployment.primary_resource_type.as_str().to_owned(),
        primary_resource_name: deployment.primary_resource_name.to_string(),
        status: deployment.status.as_str().to_owned(),
        created_at_ms: deployment.created_at_ms,
        updated_at_ms: deployment.updated_at_ms,
        failure_count: deployment.failure_count,
        last_error: deployment.last_error.as_ref().map(ToString::to_string),
    }
}

/// Map a tracked vLLM deployment into its DTO.
#[must_use]
pub fn vllm_deployment_to_dto(vllm: &VllmDeployment) -> VllmDeploymentDto {
    VllmDeploymentDto {
        deployment: deployment_to_dto(&vllm.deployment),
        model_name: vllm.fingerprint.model_name.to_string(),
        gpu_resource_type: vllm.fingerprint.gpu_resource_type.to_string(),
        gpu_resource_count: vllm.fingerprint.gpu_resource_count,
    }
}

/// Map an evaluation task into its DTO.
#[must_use]
pub fn task_to_dto(task: &EvaluationTask) -> TaskDto {
    TaskDto {
        task_id: task.task_id.as_str().to_owned(),
        project_id: task.project_id.as_str().to_owned(),
        benchmark_type: task.benchmark_type.to_string(),
        job_file_id: task.job_file_id.as_str().to_owned(),
        config_file_id: task.config_file_id.as_ref().map(|id| id.as_str().to_owned()),
        model_endpoint: task.model_endpoint.as_ref().map(ToString::to_string),
        name: task.name.to_string(),
        scheduled_at_ms: task.scheduled_at_ms,
        state: task.state.as_str().to_owned(),
        attempts: task.attempts,
        last_error: task.last_error.as_ref().map(ToString::to_string),
        deployment_id: task
            .deployment_id
            .as_ref()
            .map(|id| id.as_str().to_owned()),
    }
}
