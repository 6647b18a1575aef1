//! Static model registry for tests.

use benchkube_ports::{BoxFuture, ModelRegistry, RegisteredModelVersion};
use benchkube_shared::{RequestContext, Result};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A registry whose versions are set directly by the test.
#[derive(Debug, Default, Clone)]
pub struct StaticRegistry {
    versions: Arc<RwLock<Vec<RegisteredModelVersion>>>,
}

impl StaticRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model version.
    pub async fn push(&self, version: RegisteredModelVersion) {
        self.versions.write().await.push(version);
    }
}

impl ModelRegistry for StaticRegistry {
    fn list_model_versions<'a>(
        &'a self,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Vec<RegisteredModelVersion>>> {
        Box::pin(async move { Ok(self.versions.read().await.clone()) })
    }
}
