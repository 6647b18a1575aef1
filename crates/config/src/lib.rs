//! # benchkube-config
//!
//! Environment variable parsing and validated settings for the benchkube
//! services.
//!
//! Parsing is:
//! - strict (invalid values fail fast at startup, non-zero exit)
//! - deterministic (defaults are compile-time constants)
//! - safe (secret values are redacted in error metadata)

pub mod env;
pub mod settings;

pub use env::{EnvMap, describe_env, env_from_process};
pub use settings::{Settings, load_settings};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
