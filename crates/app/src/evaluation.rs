//! Evaluation scheduler: delayed tasks, the claim sweeper, and composition.

use crate::deployments::{DeploymentDeps, submit_deployment};
use crate::manifest::compose_eval_job;
use benchkube_domain::{
    DeploymentId, EvaluationTask, FileId, ModifiedFileId, Namespace, ProjectId, TaskId, TaskState,
    evaluation_backoff_ms,
};
use benchkube_ports::{EvaluationTaskStore, ManifestStore, TaskUpdate};
use benchkube_shared::{Clock, ErrorEnvelope, RequestContext, Result, new_task_id};
use std::sync::Arc;
use tracing::{info, warn};

/// Maximum tasks claimed per sweep.
const CLAIM_BATCH: u32 = 16;

/// Dependencies for the evaluation scheduler.
#[derive(Clone)]
pub struct EvaluationDeps {
    /// Manifest store (job + config files).
    pub manifest_store: Arc<dyn ManifestStore>,
    /// Task store (the at-most-once anchor).
    pub task_store: Arc<dyn EvaluationTaskStore>,
    /// Deployment submission dependencies.
    pub deploy: DeploymentDeps,
    /// Clock.
    pub clock: Arc<dyn Clock>,
    /// Delay before a scheduled evaluation fires.
    pub evaluation_delay_ms: u64,
    /// Maximum submission attempts per task.
    pub max_attempts: u32,
    /// Namespace used when the request does not name one.
    pub default_namespace: Namespace,
}

/// What to run: the benchmark composition parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSpec {
    /// Project the files belong to.
    pub project_id: ProjectId,
    /// Benchmark suite label (defaults to the job file's).
    pub benchmark_type: Option<Box<str>>,
    /// Job manifest to run.
    pub job_file_id: FileId,
    /// Optional evaluation config to mount.
    pub config_file_id: Option<FileId>,
    /// Optional override to use instead of the original job file.
    pub job_override_id: Option<ModifiedFileId>,
    /// Model endpoint injected as `VLLM_MODEL_ENDPOINT`.
    pub model_endpoint: Option<Box<str>>,
    /// Human-readable run name.
    pub name: Option<Box<str>>,
    /// Target namespace.
    pub namespace: Option<Namespace>,
}

/// Create a task due `evaluation_delay` from now and return it immediately.
pub async fn schedule_evaluation(
    ctx: &RequestContext,
    deps: &EvaluationDeps,
    spec: SubmissionSpec,
) -> Result<EvaluationTask> {
    // Fail early on dangling references rather than at fire time.
    let job_file = deps.manifest_store.get_file(ctx, &spec.job_file_id).await?;

    let now = deps.clock.now_ms();
    let task = EvaluationTask {
        task_id: TaskId::parse(new_task_id())?,
        project_id: spec.project_id,
        benchmark_type: spec
            .benchmark_type
            .unwrap_or_else(|| job_file.benchmark_type.clone()),
        job_file_id: spec.job_file_id,
        config_file_id: spec.config_file_id,
        job_override_id: spec.job_override_id,
        model_endpoint: spec.model_endpoint,
        name: spec
            .name
            .unwrap_or_else(|| format!("eval-{}", job_file.name).into_boxed_str()),
        scheduled_at_ms: now.saturating_add(deps.evaluation_delay_ms),
        state: TaskState::Scheduled,
        attempts: 0,
        last_error: None,
        deployment_id: None,
        created_at_ms: now,
        updated_at_ms: now,
    };
    deps.task_store.insert(ctx, task.clone()).await?;
    info!(task = %task.task_id, scheduled_at_ms = task.scheduled_at_ms, "evaluation.scheduled");
    Ok(task)
}

/// Cancel a task; valid only while `scheduled`.
pub async fn cancel_evaluation(
    ctx: &RequestContext,
    deps: &EvaluationDeps,
    task_id: &TaskId,
) -> Result<()> {
    let update = TaskUpdate {
        state: TaskState::Cancelled,
        scheduled_at_ms: None,
        attempts: None,
        last_error: None,
        deployment_id: None,
        updated_at_ms: deps.clock.now_ms(),
    };
    let cancelled = deps
        .task_store
        .transition(ctx, task_id, TaskState::Scheduled, update)
        .await?;
    if cancelled {
        Ok(())
    } else {
        Err(ErrorEnvelope::conflict(
            "task is not in the scheduled state",
        ))
    }
}

/// Outcome of one sweeper tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationOutcome {
    /// Tasks claimed this tick.
    pub claimed: u32,
    /// Tasks that completed.
    pub completed: u32,
    /// Tasks re-armed for retry.
    pub retried: u32,
    /// Tasks that exhausted their retry budget.
    pub failed: u32,
}

/// One sweeper tick: claim due tasks (conditional `scheduled -> firing`)
/// and fire each one.
pub async fn sweep_once(ctx: &RequestContext, deps: &EvaluationDeps) -> Result<EvaluationOutcome> {
    let now = deps.clock.now_ms();
    let claimed = deps.task_store.claim_due(ctx, now, CLAIM_BATCH).await?;

    let mut outcome = EvaluationOutcome {
        claimed: u32::try_from(claimed.len()).unwrap_or(u32::MAX),
        ..EvaluationOutcome::default()
    };

    for task in claimed {
        match fire_task(ctx, deps, &task).await {
            FireResult::Completed => outcome.completed += 1,
            FireResult::Retried => outcome.retried += 1,
            FireResult::Failed => outcome.failed += 1,
        }
    }
    Ok(outcome)
}

enum FireResult {
    Completed,
    Retried,
    Failed,
}

async fn fire_task(ctx: &RequestContext, deps: &EvaluationDeps, task: &EvaluationTask) -> FireResult {
    let attempts = task.attempts.saturating_add(1);
    match compose_and_submit(ctx, deps, &task_spec(task)).await {
        Ok(deployment_id) => {
            info!(task = %task.task_id, deployment = %deployment_id, "evaluation.fired");
            let update = TaskUpdate {
                state: TaskState::Completed,
                scheduled_at_ms: None,
                attempts: Some(attempts),
                last_error: None,
                deployment_id: Some(deployment_id),
                updated_at_ms: deps.clock.now_ms(),
            };
            record_transition(ctx, deps, &task.task_id, update).await;
            FireResult::Completed
        },
        Err(error) => {
            if attempts < deps.max_attempts {
                let delay = evaluation_backoff_ms(attempts);
                warn!(
                    task = %task.task_id,
                    attempts,
                    retry_in_ms = delay,
                    error = %error,
                    "evaluation.retry"
                );
                let update = TaskUpdate {
                    state: TaskState::Scheduled,
                    scheduled_at_ms: Some(deps.clock.now_ms().saturating_add(delay)),
                    attempts: Some(attempts),
                    last_error: Some(error.to_string().into_boxed_str()),
                    deployment_id: None,
                    updated_at_ms: deps.clock.now_ms(),
                };
                record_transition(ctx, deps, &task.task_id, update).await;
                FireResult::Retried
            } else {
                warn!(task = %task.task_id, attempts, error = %error, "evaluation.failed");
                let update = TaskUpdate {
                    state: TaskState::Failed,
                    scheduled_at_ms: None,
                    attempts: Some(attempts),
                    last_error: Some(error.to_string().into_boxed_str()),
                    deployment_id: None,
                    updated_at_ms: deps.clock.now_ms(),
                };
                record_transition(ctx, deps, &task.task_id, update).await;
                FireResult::Failed
            }
        },
    }
}

async fn record_transition(
    ctx: &RequestContext,
    deps: &EvaluationDeps,
    task_id: &TaskId,
    update: TaskUpdate,
) {
    match deps
        .task_store
        .transition(ctx, task_id, TaskState::Firing, update)
        .await
    {
        Ok(true) => {},
        Ok(false) => warn!(task = %task_id, "evaluation.transition lost (not firing)"),
        Err(error) => warn!(task = %task_id, error = %error, "evaluation.transition failed"),
    }
}

fn task_spec(task: &EvaluationTask) -> SubmissionSpec {
    SubmissionSpec {
        project_id: task.project_id.clone(),
        benchmark_type: Some(task.benchmark_type.clone()),
        job_file_id: task.job_file_id.clone(),
        config_file_id: task.config_file_id.clone(),
        job_override_id: task.job_override_id.clone(),
        model_endpoint: task.model_endpoint.clone(),
        name: Some(task.name.clone()),
        namespace: None,
    }
}

/// Run the composition synchronously (the `/run` path): no delay, no retry
/// budget, same pipeline.
pub async fn run_now(
    ctx: &RequestContext,
    deps: &EvaluationDeps,
    spec: SubmissionSpec,
) -> Result<DeploymentId> {
    compose_and_submit(ctx, deps, &spec).await
}

/// Compose the submission and hand it to the deployment tracker.
///
/// Override precedence: an explicitly named job override wins; otherwise the
/// most recently updated override referencing the original wins; otherwise
/// the original content is used. Config files follow the same rule.
async fn compose_and_submit(
    ctx: &RequestContext,
    deps: &EvaluationDeps,
    spec: &SubmissionSpec,
) -> Result<DeploymentId> {
    let job_bytes = match &spec.job_override_id {
        Some(override_id) => {
            deps.manifest_store
                .get_modified_file(ctx, override_id)
                .await?
                .content
        },
        None => effective_content(ctx, deps, &spec.job_file_id).await?,
    };
    let job_yaml = String::from_utf8(job_bytes)
        .map_err(|_| ErrorEnvelope::invalid("job file is not UTF-8"))?;

    let config_bytes = match &spec.config_file_id {
        Some(config_id) => Some(effective_content(ctx, deps, config_id).await?),
        None => None,
    };

    let composed = compose_eval_job(
        &job_yaml,
        config_bytes.as_deref(),
        spec.model_endpoint.as_deref(),
    )?;

    let namespace = spec
        .namespace
        .clone()
        .unwrap_or_else(|| deps.default_namespace.clone());
    let deployment = submit_deployment(ctx, &deps.deploy, &composed, namespace).await?;
    Ok(deployment.deployment_id)
}

/// Resolve a file's effective content: the most recently updated override
/// referencing it, or the original bytes when no override exists.
async fn effective_content(
    ctx: &RequestContext,
    deps: &EvaluationDeps,
    file_id: &FileId,
) -> Result<Vec<u8>> {
    let mut overrides = deps
        .manifest_store
        .list_modified_files_for_original(ctx, file_id)
        .await?;
    overrides.retain(|modified| !modified.orphaned);
    overrides.sort_by_key(|modified| modified.updated_at_ms);
    if let Some(latest) = overrides.pop() {
        return Ok(latest.content);
    }
    Ok(deps.manifest_store.get_file(ctx, file_id).await?.content)
}
