//! Model registry boundary contract.

use crate::BoxFuture;
use benchkube_shared::{RequestContext, Result};

/// One model version enumerated from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredModelVersion {
    /// Registry run identifier (mirror key).
    pub run_id: Box<str>,
    /// Experiment the run belongs to.
    pub experiment_id: Box<str>,
    /// Registered model name.
    pub model_name: Box<str>,
    /// Registered model version.
    pub model_version: Box<str>,
    /// Registration instant (epoch ms).
    pub created_at_ms: u64,
}

/// Boundary contract to the upstream model registry.
pub trait ModelRegistry: Send + Sync {
    /// Enumerate all registered model versions.
    fn list_model_versions<'a>(
        &'a self,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Vec<RegisteredModelVersion>>>;
}
