//! # benchkube-app
//!
//! Orchestration use-cases for the benchkube control plane: source sync,
//! deployment lifecycle, placement admission, evaluation scheduling, the
//! terminal broker, and the registry-to-source bridge.
//!
//! Every use-case takes its dependencies explicitly (a `*Deps` struct of
//! port trait objects) and a [`benchkube_shared::RequestContext`]; nothing
//! here owns a client or reads the wall clock directly.

pub mod bridge;
pub mod deployments;
pub mod evaluation;
pub mod manifest;
pub mod placement;
pub mod sync;
pub mod terminal;

pub use bridge::{BridgeDeps, BridgeOutcome, bridge_tick};
pub use deployments::{
    DeploymentDeps, SweepStats, delete_deployment, delete_vllm_deployment, deployment_logs,
    reconcile_sweep, submit_deployment, submit_vllm_deployment,
};
pub use evaluation::{
    EvaluationDeps, EvaluationOutcome, SubmissionSpec, cancel_evaluation, run_now,
    schedule_evaluation, sweep_once,
};
pub use manifest::{compose_eval_job, primary_resource, render_vllm_manifest};
pub use placement::{PlacementDeps, VllmDeployOutcome, admit, deploy_vllm};
pub use sync::{SyncDeps, poll_project_once};
pub use terminal::{AttachedTerminal, TerminalBroker, TerminalInput, TerminalOutput};

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
