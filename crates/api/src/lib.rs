//! # benchkube-api
//!
//! Versioned DTOs for the HTTP surface, boundary validation, and the mapping
//! from the shared error taxonomy onto HTTP status codes. This crate holds
//! no I/O; the HTTP layer in `infra` is a thin shell over these types.

pub mod v1;

/// Returns the api crate version.
#[must_use]
pub const fn api_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
