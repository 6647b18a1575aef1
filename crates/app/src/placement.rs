//! Placement engine: admission control for inference-server deployments.

use crate::deployments::{DeploymentDeps, delete_vllm_deployment, submit_vllm_deployment};
use crate::manifest::render_vllm_manifest;
use benchkube_domain::{
    AdmissionDecision, ConfigFingerprint, DeploymentId, DeploymentStatus, Namespace, VllmConfig,
};
use benchkube_ports::{DeploymentFilter, VllmDeploymentStore};
use benchkube_shared::{ErrorEnvelope, RequestContext, Result, timeout_with_context};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Dependencies for placement admission.
#[derive(Clone)]
pub struct PlacementDeps {
    /// Store of tracked inference-server deployments.
    pub vllm_store: Arc<dyn VllmDeploymentStore>,
    /// Global admission lock: decisions are taken against a consistent
    /// snapshot of the active vLLM set.
    pub admission: Arc<Mutex<()>>,
    /// Maximum time to wait for evicted victims to reach `deleted`.
    pub eviction_timeout: Duration,
}

/// Decide admission for a candidate fingerprint against the active set.
///
/// 1. Equal fingerprint among {pending, running} -> reuse that deployment.
/// 2. No GPU conflicts -> admit.
/// 3. Otherwise -> evict the conflicting deployments, then admit.
pub async fn admit(
    ctx: &RequestContext,
    deps: &PlacementDeps,
    candidate: &ConfigFingerprint,
) -> Result<AdmissionDecision> {
    let _guard = deps.admission.lock().await;
    decide(ctx, deps, candidate).await
}

async fn decide(
    ctx: &RequestContext,
    deps: &PlacementDeps,
    candidate: &ConfigFingerprint,
) -> Result<AdmissionDecision> {
    let active = deps
        .vllm_store
        .list(ctx, DeploymentFilter::active())
        .await?;

    if let Some(existing) = active
        .iter()
        .find(|existing| &existing.fingerprint == candidate)
    {
        return Ok(AdmissionDecision::Reuse(
            existing.deployment.deployment_id.clone(),
        ));
    }

    let victims: Vec<DeploymentId> = active
        .iter()
        .filter(|existing| existing.fingerprint.gpu_conflicts_with(candidate))
        .map(|existing| existing.deployment.deployment_id.clone())
        .collect();

    if victims.is_empty() {
        Ok(AdmissionDecision::Admit)
    } else {
        Ok(AdmissionDecision::EvictAndAdmit(victims))
    }
}

/// Outcome of a vLLM deploy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VllmDeployOutcome {
    /// The live deployment serving the config (new or reused).
    pub deployment_id: DeploymentId,
    /// True when an identical deployment was reused.
    pub reused: bool,
    /// Victims evicted to admit this deployment.
    pub evicted: Vec<DeploymentId>,
}

/// Admit and (when necessary) evict, then render and submit the candidate.
///
/// The admission lock is held across eviction and submission so concurrent
/// requests decide against a consistent snapshot. Eviction is single shot:
/// a failed victim delete rejects the submission with `upstream` and the
/// caller retries.
pub async fn deploy_vllm(
    ctx: &RequestContext,
    place: &PlacementDeps,
    deploy: &DeploymentDeps,
    config: VllmConfig,
    namespace: Namespace,
) -> Result<VllmDeployOutcome> {
    config.validate()?;
    let fingerprint = config.fingerprint();

    let _guard = place.admission.lock().await;
    let decision = decide(ctx, place, &fingerprint).await?;

    let evicted = match decision {
        AdmissionDecision::Reuse(existing) => {
            info!(deployment = %existing, "placement.reuse");
            return Ok(VllmDeployOutcome {
                deployment_id: existing,
                reused: true,
                evicted: Vec::new(),
            });
        },
        AdmissionDecision::Admit => Vec::new(),
        AdmissionDecision::EvictAndAdmit(victims) => {
            for victim in &victims {
                delete_vllm_deployment(ctx, deploy, victim)
                    .await
                    .map_err(|error| {
                        ErrorEnvelope::upstream(format!(
                            "eviction of {victim} failed: {}",
                            error.message
                        ))
                    })?;
                wait_deleted(ctx, place, victim).await?;
                info!(deployment = %victim, "placement.evicted");
            }
            victims
        },
    };

    let yaml = render_vllm_manifest(&config, &namespace);
    let submitted = submit_vllm_deployment(ctx, deploy, &yaml, namespace, fingerprint).await?;
    Ok(VllmDeployOutcome {
        deployment_id: submitted.deployment.deployment_id,
        reused: false,
        evicted,
    })
}

async fn wait_deleted(
    ctx: &RequestContext,
    place: &PlacementDeps,
    id: &DeploymentId,
) -> Result<()> {
    let wait = async {
        loop {
            let record = place.vllm_store.get(ctx, id).await?;
            if record.deployment.status == DeploymentStatus::Deleted {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };
    timeout_with_context(ctx, place.eviction_timeout, "placement.wait_deleted", wait).await
}
