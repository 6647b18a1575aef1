//! Normalized views of cluster resources.

use serde::{Deserialize, Serialize};

/// Resource kinds the tracker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// batch/v1 Job.
    Job,
    /// apps/v1 Deployment.
    Deployment,
    /// core/v1 Service.
    Service,
    /// core/v1 ConfigMap.
    ConfigMap,
    /// core/v1 Secret.
    Secret,
    /// Anything else.
    Unknown,
}

impl ResourceKind {
    /// Map a manifest `kind` string onto the tracked kinds.
    #[must_use]
    pub fn from_kind_str(kind: &str) -> Self {
        match kind {
            "Job" => Self::Job,
            "Deployment" => Self::Deployment,
            "Service" => Self::Service,
            "ConfigMap" => Self::ConfigMap,
            "Secret" => Self::Secret,
            _ => Self::Unknown,
        }
    }

    /// Stable string form used in storage and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Deployment => "deployment",
            Self::Service => "service",
            Self::ConfigMap => "configmap",
            Self::Secret => "secret",
            Self::Unknown => "unknown",
        }
    }
}

/// One resource created or updated by an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResource {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Raw manifest kind string (preserves kinds we do not track).
    pub kind_raw: Box<str>,
    /// Resource name.
    pub name: Box<str>,
    /// Namespace the resource landed in.
    pub namespace: Box<str>,
}

/// Coarse lifecycle phase of an observed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePhase {
    /// Created but not yet running.
    Pending,
    /// Workload is running.
    Running,
    /// Workload finished successfully.
    Succeeded,
    /// Workload failed.
    Failed,
    /// The resource no longer exists.
    NotFound,
    /// Phase could not be determined.
    Unknown,
}

/// Normalized status snapshot returned by the cluster gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceStatus {
    /// Coarse phase.
    pub phase: ResourcePhase,
    /// Condition strings, `type=status` pairs in API order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Box<str>>,
    /// Ready replica count (Deployments).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,
    /// Succeeded pod count (Jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<i32>,
    /// Failed pod count (Jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<i32>,
    /// Requested completions (Jobs; defaults to 1 when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<i32>,
    /// Backoff limit (Jobs; defaults to 6 when unset by the API).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,
    /// Start time (epoch ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_ms: Option<u64>,
    /// Completion time (epoch ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time_ms: Option<u64>,
    /// Human-readable detail (e.g. pod exit info) when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Box<str>>,
}

impl Default for ResourcePhase {
    fn default() -> Self {
        Self::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mapping_is_exact() {
        assert_eq!(ResourceKind::from_kind_str("Job"), ResourceKind::Job);
        assert_eq!(
            ResourceKind::from_kind_str("ConfigMap"),
            ResourceKind::ConfigMap
        );
        assert_eq!(
            ResourceKind::from_kind_str("CronJob"),
            ResourceKind::Unknown
        );
        assert_eq!(ResourceKind::from_kind_str("job"), ResourceKind::Unknown);
    }
}
