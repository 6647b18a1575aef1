//! Deployment lifecycle: submit, reconcile, delete, logs.

use crate::manifest;
use benchkube_domain::{
    Deployment, DeploymentId, DeploymentStatus, Namespace, ResourceKind, VllmDeployment,
    next_status,
};
use benchkube_ports::{
    ByteStream, ClusterGateway, DeploymentFilter, DeploymentStore, LogOptions, PodInfo,
    StatusUpdate, VllmDeploymentStore,
};
use benchkube_shared::{
    APPLY_TIMEOUT, Clock, ErrorEnvelope, RequestContext, Result, new_deployment_id,
    timeout_with_context,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dependencies for deployment lifecycle use-cases.
#[derive(Clone)]
pub struct DeploymentDeps {
    /// Store for benchmark deployments.
    pub store: Arc<dyn DeploymentStore>,
    /// Store for inference-server deployments.
    pub vllm_store: Arc<dyn VllmDeploymentStore>,
    /// Cluster gateway.
    pub gateway: Arc<dyn ClusterGateway>,
    /// Clock for record timestamps.
    pub clock: Arc<dyn Clock>,
    /// Failure budget for benchmark jobs.
    pub job_max_failures: u32,
    /// Failure budget for vLLM deployments.
    pub vllm_max_failures: u32,
    /// Per-sweep parallel status call cap.
    pub reconcile_parallelism: usize,
}

/// Submit a manifest: persist a pending record, then apply to the cluster.
///
/// The DB write precedes the cluster call; on cluster failure the record is
/// marked `failed` with the error and the error is returned.
pub async fn submit_deployment(
    ctx: &RequestContext,
    deps: &DeploymentDeps,
    yaml: &str,
    namespace: Namespace,
) -> Result<Deployment> {
    let record = new_record(deps, yaml, namespace)?;
    deps.store.insert(ctx, record.clone()).await?;
    let applied = apply_recorded(ctx, deps, &record, RecordStore::Jobs).await?;
    Ok(applied)
}

/// Submit an inference-server manifest with its fingerprint.
pub async fn submit_vllm_deployment(
    ctx: &RequestContext,
    deps: &DeploymentDeps,
    yaml: &str,
    namespace: Namespace,
    fingerprint: benchkube_domain::ConfigFingerprint,
) -> Result<VllmDeployment> {
    let record = new_record(deps, yaml, namespace)?;
    let vllm = VllmDeployment {
        deployment: record.clone(),
        fingerprint,
    };
    deps.vllm_store.insert(ctx, vllm.clone()).await?;
    let applied = apply_recorded(ctx, deps, &record, RecordStore::Vllm).await?;
    Ok(VllmDeployment {
        deployment: applied,
        fingerprint: vllm.fingerprint,
    })
}

fn new_record(deps: &DeploymentDeps, yaml: &str, namespace: Namespace) -> Result<Deployment> {
    let primary = manifest::primary_resource(yaml)?;
    let now = deps.clock.now_ms();
    let id = DeploymentId::parse(new_deployment_id())?;
    Ok(Deployment {
        deployment_id: id,
        yaml_content: yaml.into(),
        namespace,
        primary_resource_type: primary.kind,
        primary_resource_name: primary.name,
        status: DeploymentStatus::Pending,
        created_at_ms: now,
        updated_at_ms: now,
        failure_count: 0,
        last_error: None,
    })
}

#[derive(Clone, Copy)]
enum RecordStore {
    Jobs,
    Vllm,
}

async fn apply_recorded(
    ctx: &RequestContext,
    deps: &DeploymentDeps,
    record: &Deployment,
    which: RecordStore,
) -> Result<Deployment> {
    let apply = deps
        .gateway
        .apply(ctx, &record.yaml_content, &record.namespace);
    match timeout_with_context(ctx, APPLY_TIMEOUT, "deployment.apply", apply).await {
        Ok(applied) => {
            info!(
                deployment = %record.deployment_id,
                resources = applied.len(),
                "deployment.apply succeeded"
            );
            Ok(record.clone())
        },
        Err(error) => {
            let update = StatusUpdate {
                status: DeploymentStatus::Failed,
                failure_count: record.failure_count,
                last_error: Some(error.to_string().into_boxed_str()),
                updated_at_ms: deps.clock.now_ms(),
            };
            let write = match which {
                RecordStore::Jobs => {
                    deps.store
                        .update_status(ctx, &record.deployment_id, record.updated_at_ms, update)
                        .await
                },
                RecordStore::Vllm => {
                    deps.vllm_store
                        .update_status(ctx, &record.deployment_id, record.updated_at_ms, update)
                        .await
                },
            };
            if let Err(write_error) = write {
                warn!(
                    deployment = %record.deployment_id,
                    error = %write_error,
                    "deployment.apply failure could not be recorded"
                );
            }
            Err(error)
        },
    }
}

/// Stats from one reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Deployments observed.
    pub observed: u32,
    /// Status writes performed.
    pub updated: u32,
    /// Observation failures (logged, state kept).
    pub observe_errors: u32,
}

/// One reconciliation sweep over all non-terminal deployments.
///
/// Per-deployment status calls run in parallel up to the configured cap.
/// Observation failures (gateway unreachable) keep state and count only in
/// the stats; resource failures advance the record per the status lattice
/// and the failure budget.
pub async fn reconcile_sweep(ctx: &RequestContext, deps: &DeploymentDeps) -> Result<SweepStats> {
    let jobs = deps
        .store
        .list(ctx, DeploymentFilter::non_terminal())
        .await?;
    let vllms = deps
        .vllm_store
        .list(ctx, DeploymentFilter::non_terminal())
        .await?;

    let mut work: Vec<(Deployment, RecordStore, u32)> = Vec::new();
    for deployment in jobs {
        work.push((deployment, RecordStore::Jobs, deps.job_max_failures));
    }
    for vllm in vllms {
        work.push((vllm.deployment, RecordStore::Vllm, deps.vllm_max_failures));
    }

    let mut stats = SweepStats::default();
    let results = futures_util::stream::iter(work.into_iter().map(|(record, which, budget)| {
        let deps = deps.clone();
        async move { reconcile_one(ctx, &deps, record, which, budget).await }
    }))
    .buffer_unordered(deps.reconcile_parallelism.max(1))
    .collect::<Vec<_>>()
    .await;

    for result in results {
        stats.observed = stats.observed.saturating_add(1);
        match result {
            Ok(true) => stats.updated = stats.updated.saturating_add(1),
            Ok(false) => {},
            Err(_) => stats.observe_errors = stats.observe_errors.saturating_add(1),
        }
    }
    Ok(stats)
}

async fn reconcile_one(
    ctx: &RequestContext,
    deps: &DeploymentDeps,
    record: Deployment,
    which: RecordStore,
    max_failures: u32,
) -> Result<bool> {
    ctx.ensure_not_cancelled("reconcile.one")?;

    let observed = match deps
        .gateway
        .get_status(
            ctx,
            record.primary_resource_type,
            &record.namespace,
            &record.primary_resource_name,
        )
        .await
    {
        Ok(observed) => observed,
        Err(error) => {
            // Observation failure: log and keep state.
            debug!(
                deployment = %record.deployment_id,
                error = %error,
                "reconcile.observe failed"
            );
            return Err(error);
        },
    };

    let decision = next_status(record.primary_resource_type, record.status, &observed);
    let mut failure_count = record.failure_count;
    if decision.pod_failure_observed {
        failure_count = failure_count.saturating_add(1);
    }

    // Budget exhausted: pin to failed, even if the resource later recovers.
    let mut next = decision.next;
    if failure_count >= max_failures && !matches!(next, DeploymentStatus::Deleted) {
        next = DeploymentStatus::Failed;
    }

    let error_changed = decision.error.is_some() && decision.error != record.last_error;
    if next == record.status && failure_count == record.failure_count && !error_changed {
        return Ok(false);
    }

    let update = StatusUpdate {
        status: next,
        failure_count,
        last_error: decision.error.or_else(|| record.last_error.clone()),
        updated_at_ms: deps.clock.now_ms(),
    };
    let wrote = match which {
        RecordStore::Jobs => {
            deps.store
                .update_status(ctx, &record.deployment_id, record.updated_at_ms, update)
                .await?
        },
        RecordStore::Vllm => {
            deps.vllm_store
                .update_status(ctx, &record.deployment_id, record.updated_at_ms, update)
                .await?
        },
    };
    if !wrote {
        debug!(
            deployment = %record.deployment_id,
            "reconcile.write lost the conditional update"
        );
    }
    Ok(wrote)
}

/// Delete a benchmark deployment: cluster resources first (from the stored
/// YAML), then the status transition. Idempotent.
pub async fn delete_deployment(
    ctx: &RequestContext,
    deps: &DeploymentDeps,
    id: &DeploymentId,
) -> Result<()> {
    let record = deps.store.get(ctx, id).await?;
    if record.status == DeploymentStatus::Deleted {
        return Ok(());
    }
    deps.gateway
        .delete(ctx, &record.yaml_content, &record.namespace)
        .await?;
    let update = StatusUpdate {
        status: DeploymentStatus::Deleted,
        failure_count: record.failure_count,
        last_error: record.last_error.clone(),
        updated_at_ms: deps.clock.now_ms(),
    };
    deps.store
        .update_status(ctx, id, record.updated_at_ms, update)
        .await?;
    info!(deployment = %id, "deployment.deleted");
    Ok(())
}

/// Delete an inference-server deployment. Idempotent.
pub async fn delete_vllm_deployment(
    ctx: &RequestContext,
    deps: &DeploymentDeps,
    id: &DeploymentId,
) -> Result<()> {
    let record = deps.vllm_store.get(ctx, id).await?;
    if record.deployment.status == DeploymentStatus::Deleted {
        return Ok(());
    }
    deps.gateway
        .delete(ctx, &record.deployment.yaml_content, &record.deployment.namespace)
        .await?;
    let update = StatusUpdate {
        status: DeploymentStatus::Deleted,
        failure_count: record.deployment.failure_count,
        last_error: record.deployment.last_error.clone(),
        updated_at_ms: deps.clock.now_ms(),
    };
    deps.vllm_store
        .update_status(ctx, id, record.deployment.updated_at_ms, update)
        .await?;
    info!(deployment = %id, "vllm.deployment.deleted");
    Ok(())
}

/// Stream logs from a deployment's primary pod.
///
/// Pod selection: for Jobs the most recently started pod, for Deployments
/// any ready replica.
pub async fn deployment_logs(
    ctx: &RequestContext,
    deps: &DeploymentDeps,
    id: &DeploymentId,
    options: LogOptions,
) -> Result<ByteStream> {
    let record = deps.store.get(ctx, id).await?;
    let pod = primary_pod(ctx, deps, &record).await?;
    deps.gateway
        .tail_logs(ctx, &record.namespace, &pod.name, options)
        .await
}

/// Resolve the primary pod of a deployment.
pub async fn primary_pod(
    ctx: &RequestContext,
    deps: &DeploymentDeps,
    record: &Deployment,
) -> Result<PodInfo> {
    let selector = match record.primary_resource_type {
        ResourceKind::Job => format!("job-name={}", record.primary_resource_name),
        _ => format!("app={}", record.primary_resource_name),
    };
    let mut pods = deps
        .gateway
        .list_pods(ctx, &record.namespace, &selector)
        .await?;
    if pods.is_empty() {
        return Err(ErrorEnvelope::not_found(format!(
            "no pods found for deployment {}",
            record.deployment_id
        )));
    }

    match record.primary_resource_type {
        ResourceKind::Job => {
            pods.sort_by_key(|pod| pod.started_at_ms.unwrap_or(0));
            pods.pop().ok_or_else(|| {
                ErrorEnvelope::not_found("no pods found for deployment".to_string())
            })
        },
        _ => pods
            .into_iter()
            .find(|pod| pod.ready)
            .ok_or_else(|| ErrorEnvelope::transient("no ready replica available")),
    }
}
