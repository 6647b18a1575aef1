//! # benchkube-infra
//!
//! Composition root and runtime shell for the benchkube control plane:
//! client initialization, background loops, the HTTP/WebSocket surface,
//! and graceful shutdown. This crate wires `adapters` into `app` behind
//! the `ports` contracts; it holds no orchestration logic of its own.

pub mod http;
pub mod loops;
pub mod poller;
pub mod server;
pub mod state;

pub use http::{ApiError, deployer_router, eval_router, vllm_router};
pub use loops::spawn_interval_loop;
pub use poller::SyncScheduler;
pub use server::{build_state, run, spawn_loops};
pub use state::{AppState, HealthProbe};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
