//! Tracked deployment bundles and their status lattice.

use crate::primitives::{DeploymentId, Namespace};
use crate::resource::{ResourceKind, ResourcePhase, ResourceStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a tracked deployment bundle.
///
/// Lattice: `pending -> running -> completed`, `pending|running -> failed`,
/// any -> `deleted`. Terminal states (`completed`, `failed`) only admit the
/// transition to `deleted`; `deleted` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Recorded, cluster resources not yet running.
    Pending,
    /// Primary resource is running.
    Running,
    /// Primary resource finished successfully.
    Completed,
    /// Primary resource failed (or the failure budget was exhausted).
    Failed,
    /// Resources were deleted (by request or disappearance).
    Deleted,
}

impl DeploymentStatus {
    /// Whether a transition from `self` to `next` respects the lattice.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            // Self-transitions are write-if-changed no-ops upstream.
            (a, b) if a == b => true,
            (_, Self::Deleted) => true,
            (Self::Pending, Self::Running | Self::Completed | Self::Failed)
            | (Self::Running, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }

    /// Terminal states never progress on reconciliation.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Deleted)
    }

    /// Stable string form used in storage and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A tracked bundle of cluster resources created from one apply request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment identifier (ULID).
    pub deployment_id: DeploymentId,
    /// Exact YAML bytes submitted; deletes reuse these, never re-derived.
    pub yaml_content: Box<str>,
    /// Namespace the bundle was applied to.
    pub namespace: Namespace,
    /// Kind of the primary resource (first document in apply order).
    pub primary_resource_type: ResourceKind,
    /// Name of the primary resource.
    pub primary_resource_name: Box<str>,
    /// Current status.
    pub status: DeploymentStatus,
    /// Creation timestamp (epoch ms).
    pub created_at_ms: u64,
    /// Last status write (epoch ms); reconciler writes are conditional on it.
    pub updated_at_ms: u64,
    /// Reconciliations that observed a pod failure.
    pub failure_count: u32,
    /// Most recent error detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<Box<str>>,
}

/// Outcome of one reconciliation observation for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDecision {
    /// The status the deployment should move to (may equal the current one).
    pub next: DeploymentStatus,
    /// True when this observation saw a pod failure (counts against the budget).
    pub pod_failure_observed: bool,
    /// Error detail to record, when any.
    pub error: Option<Box<str>>,
}

/// Compute the next status from an observed resource snapshot.
///
/// Pure function so the reconciler's behavior is testable without a cluster.
/// Once the failure budget is exhausted the caller pins the status to
/// `failed` regardless of what the resource does later; that policy lives in
/// the app layer, not here.
#[must_use]
pub fn next_status(
    kind: ResourceKind,
    current: DeploymentStatus,
    observed: &ResourceStatus,
) -> StatusDecision {
    if current.is_terminal() {
        return StatusDecision {
            next: current,
            pod_failure_observed: false,
            error: None,
        };
    }

    let candidate = match observed.phase {
        ResourcePhase::NotFound => {
            return StatusDecision {
                next: DeploymentStatus::Deleted,
                pod_failure_observed: false,
                error: Some("resource disappeared from the cluster".into()),
            };
        },
        ResourcePhase::Failed => {
            return StatusDecision {
                next: DeploymentStatus::Failed,
                pod_failure_observed: true,
                error: observed.message.clone(),
            };
        },
        ResourcePhase::Succeeded => DeploymentStatus::Completed,
        ResourcePhase::Running => DeploymentStatus::Running,
        ResourcePhase::Pending | ResourcePhase::Unknown => current,
    };

    match kind {
        ResourceKind::Job => job_decision(current, observed),
        ResourceKind::Deployment => deployment_decision(current, observed, candidate),
        _ => clamp(current, candidate, false, None),
    }
}

fn job_decision(current: DeploymentStatus, observed: &ResourceStatus) -> StatusDecision {
    let completions = observed.completions.unwrap_or(1).max(1);
    let backoff_limit = observed.backoff_limit.unwrap_or(6);
    let succeeded = observed.succeeded.unwrap_or(0);
    let failed = observed.failed.unwrap_or(0);

    if succeeded >= completions {
        return clamp(current, DeploymentStatus::Completed, false, None);
    }
    if failed > backoff_limit {
        let error = observed
            .message
            .clone()
            .unwrap_or_else(|| format!("job exceeded backoffLimit ({failed} failed pods)").into());
        return clamp(current, DeploymentStatus::Failed, true, Some(error));
    }

    let pod_failure = failed > 0;
    let error = pod_failure.then(|| {
        observed
            .message
            .clone()
            .unwrap_or_else(|| format!("{failed} pod failure(s) observed").into())
    });
    let next = if observed.start_time_ms.is_some() || failed > 0 || succeeded > 0 {
        DeploymentStatus::Running
    } else {
        DeploymentStatus::Pending
    };
    clamp(current, next, pod_failure, error)
}

fn deployment_decision(
    current: DeploymentStatus,
    observed: &ResourceStatus,
    candidate: DeploymentStatus,
) -> StatusDecision {
    if observed.ready_replicas.unwrap_or(0) >= 1 {
        return clamp(current, DeploymentStatus::Running, false, None);
    }
    // Deployments never complete; they run until deleted.
    let next = if candidate == DeploymentStatus::Completed {
        DeploymentStatus::Running
    } else {
        candidate
    };
    clamp(current, next, false, None)
}

fn clamp(
    current: DeploymentStatus,
    next: DeploymentStatus,
    pod_failure_observed: bool,
    error: Option<Box<str>>,
) -> StatusDecision {
    let next = if current.can_transition_to(next) {
        next
    } else {
        current
    };
    StatusDecision {
        next,
        pod_failure_observed,
        error,
    }
}
