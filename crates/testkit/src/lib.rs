//! # benchkube-testkit
//!
//! In-memory fakes for every port, a manual clock, and a scripted cluster
//! gateway. Used by app and infra tests; never part of the server build.

pub mod clock;
pub mod cluster;
pub mod registry;
pub mod source;
pub mod stores;

pub use clock::ManualClock;
pub use cluster::ScriptedClusterGateway;
pub use registry::StaticRegistry;
pub use source::InMemorySourceClient;
pub use stores::{
    InMemoryDeploymentStore, InMemoryManifestStore, InMemoryTaskStore, InMemoryVllmStore,
};

/// Returns the testkit crate version.
#[must_use]
pub const fn testkit_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
