//! # benchkube-adapters
//!
//! Adapter implementations for the benchkube ports:
//!
//! - `mongo`: document-store implementations of the manifest, deployment,
//!   and evaluation-task stores (MongoDB, replica-set durability assumed).
//! - `kube`: the cluster gateway (server-side apply, status, logs, exec).
//! - `source`: GitHub-style contents API client for the versioned source.
//! - `registry`: MLflow-style model registry client.

pub mod kube_gateway;
pub mod mongo;
pub mod registry;
pub mod source;

pub use kube_gateway::KubeClusterGateway;
pub use mongo::{MongoStores, ensure_indexes};
pub use registry::{MlflowRegistry, MlflowRegistryConfig};
pub use source::{GithubSourceClient, GithubSourceConfig, RateLimiter};

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
