//! Deployment and vLLM deployment store contracts.

use crate::BoxFuture;
use benchkube_domain::{Deployment, DeploymentId, DeploymentStatus, VllmDeployment};
use benchkube_shared::{RequestContext, Result};

/// Filter for deployment listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentFilter {
    /// Restrict to these statuses (empty = all).
    pub statuses: Vec<DeploymentStatus>,
}

impl DeploymentFilter {
    /// Filter matching the non-terminal statuses the reconciler sweeps.
    #[must_use]
    pub fn non_terminal() -> Self {
        Self {
            statuses: vec![DeploymentStatus::Pending, DeploymentStatus::Running],
        }
    }

    /// Filter matching the active statuses placement admission considers.
    #[must_use]
    pub fn active() -> Self {
        Self::non_terminal()
    }
}

/// Conditional status write for one deployment.
///
/// Applied only when the stored `updated_at_ms` equals the expected value,
/// which serializes reconciler writes per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// New status.
    pub status: DeploymentStatus,
    /// New failure counter.
    pub failure_count: u32,
    /// New error detail, when any.
    pub last_error: Option<Box<str>>,
    /// Write timestamp (epoch ms).
    pub updated_at_ms: u64,
}

/// Store for tracked benchmark deployments.
pub trait DeploymentStore: Send + Sync {
    /// Insert a new deployment record; `conflict` when the id exists.
    fn insert<'a>(
        &'a self,
        ctx: &'a RequestContext,
        deployment: Deployment,
    ) -> BoxFuture<'a, Result<()>>;

    /// Fetch a deployment; `not_found` when absent.
    fn get<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a DeploymentId,
    ) -> BoxFuture<'a, Result<Deployment>>;

    /// List deployments matching the filter.
    fn list<'a>(
        &'a self,
        ctx: &'a RequestContext,
        filter: DeploymentFilter,
    ) -> BoxFuture<'a, Result<Vec<Deployment>>>;

    /// Conditionally update status; returns false when the write was lost.
    fn update_status<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a DeploymentId,
        expected_updated_at_ms: u64,
        update: StatusUpdate,
    ) -> BoxFuture<'a, Result<bool>>;
}

/// Store for tracked inference-server deployments (with fingerprints).
pub trait VllmDeploymentStore: Send + Sync {
    /// Insert a new vLLM deployment record.
    fn insert<'a>(
        &'a self,
        ctx: &'a RequestContext,
        deployment: VllmDeployment,
    ) -> BoxFuture<'a, Result<()>>;

    /// Fetch a vLLM deployment; `not_found` when absent.
    fn get<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a DeploymentId,
    ) -> BoxFuture<'a, Result<VllmDeployment>>;

    /// List vLLM deployments matching the filter.
    fn list<'a>(
        &'a self,
        ctx: &'a RequestContext,
        filter: DeploymentFilter,
    ) -> BoxFuture<'a, Result<Vec<VllmDeployment>>>;

    /// Conditionally update status; returns false when the write was lost.
    fn update_status<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a DeploymentId,
        expected_updated_at_ms: u64,
        update: StatusUpdate,
    ) -> BoxFuture<'a, Result<bool>>;
}
