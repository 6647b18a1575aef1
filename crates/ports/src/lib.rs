//! # benchkube-ports
//!
//! Port traits for the benchkube hexagonal architecture.
//!
//! This crate defines the interfaces between the orchestration use-cases and
//! the infrastructure layer (MongoDB, the Kubernetes API, the versioned
//! source, the model registry). It depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
///
/// We deliberately use boxed futures for boundary traits (I/O-bound work);
/// none of these calls sit on a hot path where the allocation would matter.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Boxed byte stream used for log tailing and exec output.
pub type ByteStream = futures_util::stream::BoxStream<'static, benchkube_shared::Result<bytes::Bytes>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod cluster;
pub mod evaluation;
pub mod manifest;
pub mod registry;
pub mod source;
pub mod stores;

pub use cluster::*;
pub use evaluation::*;
pub use manifest::*;
pub use registry::*;
pub use source::*;
pub use stores::*;

// Re-export selected domain types used in port signatures, so adapter crates
// can implement ports without directly depending on `benchkube-domain`.
pub use benchkube_domain::{
    AppliedResource, Deployment, DeploymentId, DeploymentStatus, EvaluationTask, FileId,
    ModifiedFile, ModifiedFileId, Namespace, Project, ProjectId, ResourceKind, ResourceStatus,
    SessionId, SourceFile, TaskId, TaskState, VllmDeployment,
};
