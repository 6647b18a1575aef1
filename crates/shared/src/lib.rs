//! # benchkube-shared
//!
//! Shared utilities, result types, and error handling for the benchkube workspace.
//!
//! This crate provides foundational types that are used across all other crates:
//!
//! - Result and error envelope types with the control-plane error taxonomy
//! - Concurrency primitives (cancellation, request context, tick gates)
//! - Clock abstraction and identifier generation
//!
//! ## Design Principles
//!
//! 1. **No workspace dependencies** - This crate only depends on external crates
//! 2. **Serde-compatible** - All public types support serialization
//! 3. **Testable time** - Nothing here reads the wall clock except `SystemClock`

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod clock;
pub mod concurrency;
pub mod errors;
pub mod ids;
pub mod redaction;
pub mod result;
pub mod retry;
pub mod timeout;

pub use clock::{Clock, SystemClock};
pub use concurrency::{CancellationToken, CorrelationId, RequestContext, TickGate, TickPermit};
pub use errors::{
    ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata, REDACTED_VALUE,
    redact_metadata,
};
pub use ids::{new_deployment_id, new_override_id, new_session_id, new_task_id};
pub use redaction::{
    REDACTED, SecretString, is_secret_key, mask_embedded_credentials, redact_if_secret,
};
pub use result::Result;
pub use retry::{RetryPolicy, backoff_delay, jitter_seed, retry_async};
pub use timeout::{APPLY_TIMEOUT, DEFAULT_CALL_TIMEOUT, bounded_call, timeout_with_context};

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::errors::{ErrorClass, ErrorEnvelope, ErrorKind};

    #[test]
    fn shared_error_types_are_available() {
        let error = ErrorEnvelope::invalid("bad request");
        assert_eq!(error.kind, ErrorKind::Expected);
        assert_eq!(error.class, ErrorClass::NonRetriable);
    }
}
