//! # benchkube-domain
//!
//! Domain entities, value objects, and state machines for the benchkube
//! control plane. This crate depends only on `shared` and holds no I/O:
//! everything here is a pure data type or a pure transition function, so
//! the orchestration invariants (status monotonicity, placement safety,
//! at-most-once firing) are testable without a cluster or a database.

pub mod deployment;
pub mod evaluation;
pub mod files;
pub mod primitives;
pub mod project;
pub mod resource;
pub mod terminal;
pub mod vllm;

pub use deployment::{Deployment, DeploymentStatus, StatusDecision, next_status};
pub use evaluation::{EvaluationTask, TaskState, evaluation_backoff_ms};
pub use files::{FileType, ModifiedFile, SourceFile};
pub use primitives::{
    DeploymentId, FileId, ModifiedFileId, Namespace, ProjectId, SessionId, TaskId,
};
pub use project::{PollOutcome, Project};
pub use resource::{AppliedResource, ResourceKind, ResourcePhase, ResourceStatus};
pub use terminal::TerminalSession;
pub use vllm::{AdmissionDecision, CanonicalValue, ConfigFingerprint, VllmConfig, VllmDeployment};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
