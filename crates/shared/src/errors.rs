//! Error envelope types and the control-plane error taxonomy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata attached to errors for diagnostics.
pub type ErrorMetadata = BTreeMap<String, String>;

/// Redacted placeholder value for sensitive metadata.
pub const REDACTED_VALUE: &str = "<redacted>";

/// High-level classification of error origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Expected failures (validation, user input, cancellation, conflicts).
    Expected,
    /// Invariant violations in domain logic.
    Invariant,
    /// Unexpected failures (I/O, cluster, database, external dependencies).
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected => formatter.write_str("expected"),
            Self::Invariant => formatter.write_str("invariant"),
            Self::Unexpected => formatter.write_str("unexpected"),
        }
    }
}

/// Retry classification for failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// The operation can be retried safely.
    Retriable,
    /// The operation should not be retried.
    NonRetriable,
}

impl ErrorClass {
    /// Returns true when the error is considered retriable.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Retriable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retriable => formatter.write_str("retriable"),
            Self::NonRetriable => formatter.write_str("non-retriable"),
        }
    }
}

/// Stable error code with namespace and identifier.
///
/// The `core` namespace carries the taxonomy handlers map onto HTTP statuses:
/// `not_found`, `conflict`, `invalid`, `unauthorized`, `upstream`,
/// `transient`, `fatal`. Subsystems attach their own namespaces
/// (`cluster`, `source`, `store`, ...) for finer-grained diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode {
    namespace: String,
    code: String,
}

impl ErrorCode {
    /// Create a new error code with a namespace and code.
    pub fn new(namespace: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            code: code.into(),
        }
    }

    /// Entity not found.
    pub fn not_found() -> Self {
        Self::new("core", "not_found")
    }

    /// Uniqueness violation or admission conflict.
    pub fn conflict() -> Self {
        Self::new("core", "conflict")
    }

    /// Schema or validation failure.
    pub fn invalid() -> Self {
        Self::new("core", "invalid")
    }

    /// Missing or rejected credentials.
    pub fn unauthorized() -> Self {
        Self::new("core", "unauthorized")
    }

    /// Source or cluster unreachable.
    pub fn upstream() -> Self {
        Self::new("core", "upstream")
    }

    /// Transient failure, retriable.
    pub fn transient() -> Self {
        Self::new("core", "transient")
    }

    /// Fatal failure, do not retry.
    pub fn fatal() -> Self {
        Self::new("core", "fatal")
    }

    /// Operation cancelled.
    pub fn cancelled() -> Self {
        Self::new("core", "cancelled")
    }

    /// Operation timed out.
    pub fn timeout() -> Self {
        Self::new("core", "timeout")
    }

    /// Returns the namespace portion.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the code identifier.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.namespace, self.code)
    }
}

/// Structured error envelope shared across crates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Error kind describing the origin category.
    pub kind: ErrorKind,
    /// Retry classification.
    pub class: ErrorClass,
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable error message (the user-visible `detail` string).
    pub message: String,
    /// Additional diagnostic metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: ErrorMetadata,
}

impl ErrorEnvelope {
    /// Create an expected error with non-retriable classification.
    pub fn expected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::expected_with_class(code, message, ErrorClass::NonRetriable)
    }

    /// Create an expected error with an explicit retry classification.
    pub fn expected_with_class(
        code: ErrorCode,
        message: impl Into<String>,
        class: ErrorClass,
    ) -> Self {
        Self {
            kind: ErrorKind::Expected,
            class,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create an invariant error (always non-retriable).
    pub fn invariant(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Invariant,
            class: ErrorClass::NonRetriable,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create an unexpected error with the provided retry classification.
    pub fn unexpected(code: ErrorCode, message: impl Into<String>, class: ErrorClass) -> Self {
        Self {
            kind: ErrorKind::Unexpected,
            class,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Entity not found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::not_found(), message)
    }

    /// Uniqueness violation or admission conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::conflict(), message)
    }

    /// Schema or validation failure.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::invalid(), message)
    }

    /// Missing or rejected credentials.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::unauthorized(), message)
    }

    /// Source or cluster unreachable (retriable by policy).
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::unexpected(ErrorCode::upstream(), message, ErrorClass::Retriable)
    }

    /// Transient failure, retriable.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::unexpected(ErrorCode::transient(), message, ErrorClass::Retriable)
    }

    /// Fatal failure, never retried.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::unexpected(ErrorCode::fatal(), message, ErrorClass::NonRetriable)
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::expected_with_class(ErrorCode::cancelled(), message, ErrorClass::NonRetriable)
    }

    /// Returns true if the error represents a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::cancelled()
    }

    /// Attach a single metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace metadata with a redacted copy for the provided keys.
    #[must_use]
    pub fn redact_metadata(self, keys: &[&str]) -> Self {
        Self {
            metadata: redact_metadata(self.metadata, keys),
            ..self
        }
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {} {}: {}",
            self.kind, self.class, self.code, self.message
        )
    }
}

impl std::error::Error for ErrorEnvelope {}

impl From<std::io::Error> for ErrorEnvelope {
    fn from(error: std::io::Error) -> Self {
        let class = if is_retriable_io(error.kind()) {
            ErrorClass::Retriable
        } else {
            ErrorClass::NonRetriable
        };
        Self::unexpected(ErrorCode::new("core", "io"), error.to_string(), class)
    }
}

/// Redact sensitive metadata values for the provided keys.
#[must_use]
pub fn redact_metadata(mut metadata: ErrorMetadata, keys: &[&str]) -> ErrorMetadata {
    for key in keys {
        if metadata.contains_key(*key) {
            metadata.insert((*key).to_string(), REDACTED_VALUE.to_string());
        }
    }

    metadata
}

const fn is_retriable_io(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_constructors() {
        let not_found = ErrorEnvelope::not_found("no such project");
        assert_eq!(not_found.kind, ErrorKind::Expected);
        assert_eq!(not_found.code, ErrorCode::not_found());

        let conflict = ErrorEnvelope::conflict("duplicate name");
        assert_eq!(conflict.class, ErrorClass::NonRetriable);

        let upstream = ErrorEnvelope::upstream("cluster unreachable");
        assert_eq!(upstream.kind, ErrorKind::Unexpected);
        assert!(upstream.class.is_retriable());

        let fatal = ErrorEnvelope::fatal("bad init");
        assert!(!fatal.class.is_retriable());
    }

    #[test]
    fn cancellation_is_detected() {
        let cancelled = ErrorEnvelope::cancelled("stopped");
        assert!(cancelled.is_cancelled());
        assert!(!ErrorEnvelope::invalid("nope").is_cancelled());
    }

    #[test]
    fn io_errors_classify_by_kind() {
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        let envelope = ErrorEnvelope::from(timeout);
        assert!(envelope.class.is_retriable());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        let envelope = ErrorEnvelope::from(denied);
        assert_eq!(envelope.class, ErrorClass::NonRetriable);
    }

    #[test]
    fn metadata_redaction() {
        let error = ErrorEnvelope::invalid("bad")
            .with_metadata("token", "secret")
            .with_metadata("path", "configs/a.yaml");
        let redacted = error.redact_metadata(&["token"]);

        assert_eq!(
            redacted.metadata.get("token").map(String::as_str),
            Some(REDACTED_VALUE)
        );
        assert_eq!(
            redacted.metadata.get("path").map(String::as_str),
            Some("configs/a.yaml")
        );
    }
}
