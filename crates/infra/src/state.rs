//! Composition root: shared clients and per-request dependency bundles.
//!
//! Clients are initialized once at startup and passed explicitly; nothing
//! in the workspace reaches for a global.

use crate::poller::SyncScheduler;
use benchkube_app::{DeploymentDeps, EvaluationDeps, PlacementDeps, SyncDeps, TerminalBroker};
use benchkube_config::Settings;
use benchkube_ports::{
    BoxFuture, ClusterGateway, DeploymentStore, EvaluationTaskStore, ManifestStore, ModelRegistry,
    SourceClient, VllmDeploymentStore,
};
use benchkube_shared::{CancellationToken, Clock, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Liveness probe against the backing database.
pub trait HealthProbe: Send + Sync {
    /// Resolves when the database answers.
    fn ping(&self) -> BoxFuture<'_, Result<()>>;
}

impl HealthProbe for benchkube_adapters::MongoStores {
    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.ping())
    }
}

/// Everything the HTTP surface and the loops share.
pub struct AppState {
    /// Validated settings.
    pub settings: Settings,
    /// Clock.
    pub clock: Arc<dyn Clock>,
    /// Manifest store.
    pub manifest_store: Arc<dyn ManifestStore>,
    /// Benchmark deployment store.
    pub deployment_store: Arc<dyn DeploymentStore>,
    /// Inference-server deployment store.
    pub vllm_store: Arc<dyn VllmDeploymentStore>,
    /// Evaluation task store.
    pub task_store: Arc<dyn EvaluationTaskStore>,
    /// Cluster gateway.
    pub gateway: Arc<dyn ClusterGateway>,
    /// Versioned-source client.
    pub source: Arc<dyn SourceClient>,
    /// Model registry client (bridge disabled when absent).
    pub registry: Option<Arc<dyn ModelRegistry>>,
    /// Terminal broker.
    pub broker: Arc<TerminalBroker>,
    /// Source poll scheduler.
    pub sync_scheduler: Arc<SyncScheduler>,
    /// Global placement admission lock.
    pub admission: Arc<Mutex<()>>,
    /// Database liveness probe.
    pub health: Arc<dyn HealthProbe>,
    /// Process-wide shutdown token.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Deployment lifecycle dependencies.
    #[must_use]
    pub fn deploy_deps(&self) -> DeploymentDeps {
        DeploymentDeps {
            store: Arc::clone(&self.deployment_store),
            vllm_store: Arc::clone(&self.vllm_store),
            gateway: Arc::clone(&self.gateway),
            clock: Arc::clone(&self.clock),
            job_max_failures: self.settings.job_max_failures,
            vllm_max_failures: self.settings.vllm_max_failures,
            reconcile_parallelism: usize::try_from(self.settings.reconcile_parallelism)
                .unwrap_or(16),
        }
    }

    /// Placement admission dependencies.
    #[must_use]
    pub fn placement_deps(&self) -> PlacementDeps {
        PlacementDeps {
            vllm_store: Arc::clone(&self.vllm_store),
            admission: Arc::clone(&self.admission),
            eviction_timeout: Duration::from_secs(self.settings.deployment_timeout_secs),
        }
    }

    /// Evaluation scheduler dependencies.
    #[must_use]
    pub fn evaluation_deps(&self) -> EvaluationDeps {
        EvaluationDeps {
            manifest_store: Arc::clone(&self.manifest_store),
            task_store: Arc::clone(&self.task_store),
            deploy: self.deploy_deps(),
            clock: Arc::clone(&self.clock),
            evaluation_delay_ms: self.settings.evaluation_delay_ms(),
            max_attempts: 3,
            default_namespace: self.settings.default_namespace.clone(),
        }
    }

    /// Source sync dependencies.
    #[must_use]
    pub fn sync_deps(&self) -> SyncDeps {
        SyncDeps {
            store: Arc::clone(&self.manifest_store),
            source: Arc::clone(&self.source),
            clock: Arc::clone(&self.clock),
        }
    }
}
