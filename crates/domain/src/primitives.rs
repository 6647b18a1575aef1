//! Domain primitives with validated constructors.

use benchkube_shared::ErrorEnvelope;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Box<str>);

        impl $name {
            /// Parse from user input; the value is trimmed and must be non-empty.
            pub fn parse(value: impl AsRef<str>) -> Result<Self, ErrorEnvelope> {
                let trimmed = value.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(ErrorEnvelope::invalid(concat!(
                        $label,
                        " must be non-empty"
                    )));
                }
                Ok(Self(trimmed.into()))
            }

            /// Borrow the identifier as a string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(self.as_str())
            }
        }
    };
}

string_id!(
    /// Identifier of a [`crate::Project`].
    ProjectId,
    "projectId"
);
string_id!(
    /// Identifier of a tracked deployment bundle (ULID).
    DeploymentId,
    "deploymentId"
);
string_id!(
    /// Identifier of a user-authored override file.
    ModifiedFileId,
    "modifiedFileId"
);
string_id!(
    /// Identifier of a terminal session (UUID).
    SessionId,
    "sessionId"
);
string_id!(
    /// Identifier of a scheduled evaluation task (UUID).
    TaskId,
    "taskId"
);

/// Identifier of an original source file snapshot.
///
/// Deterministic from `(path, first-seen-commit)` so re-observing the same
/// file at the same introduction commit always yields the same id, and the
/// id survives content changes (overrides stay linked).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Box<str>);

impl FileId {
    /// Derive the id for a path first observed at `commit`.
    #[must_use]
    pub fn derive(path: &str, commit: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(commit.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(32);
        for byte in digest.iter().take(16) {
            use fmt::Write as _;
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex.into_boxed_str())
    }

    /// Parse from persisted input; the value is trimmed and must be non-empty.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, ErrorEnvelope> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::invalid("fileId must be non-empty"));
        }
        Ok(Self(trimmed.into()))
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A Kubernetes namespace name.
///
/// RFC 1123 label: lowercase alphanumerics and `-`, at most 63 characters,
/// starting and ending with an alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(Box<str>);

impl Namespace {
    /// Parse and validate a namespace name.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, ErrorEnvelope> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() || trimmed.len() > 63 {
            return Err(ErrorEnvelope::invalid(
                "namespace must be 1-63 characters long",
            ));
        }
        let valid_chars = trimmed
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        let valid_edges = trimmed.starts_with(|c: char| c.is_ascii_alphanumeric())
            && trimmed.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !valid_chars || !valid_edges {
            return Err(ErrorEnvelope::invalid(format!(
                "namespace '{trimmed}' is not a valid RFC 1123 label"
            )));
        }
        Ok(Self(trimmed.into()))
    }

    /// The `default` namespace.
    #[must_use]
    pub fn default_namespace() -> Self {
        Self("default".into())
    }

    /// Borrow the namespace as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_reject_empty_input() {
        assert!(ProjectId::parse("  ").is_err());
        assert!(DeploymentId::parse("").is_err());
        let ok = ProjectId::parse(" p1 ");
        assert_eq!(ok.as_ref().map(ProjectId::as_str), Ok("p1"));
    }

    #[test]
    fn file_id_is_deterministic_and_commit_scoped() {
        let a = FileId::derive("jobs/latency.yaml", "abc123");
        let b = FileId::derive("jobs/latency.yaml", "abc123");
        let c = FileId::derive("jobs/latency.yaml", "def456");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn namespace_validation() {
        assert!(Namespace::parse("default").is_ok());
        assert!(Namespace::parse("bench-runs-01").is_ok());
        assert!(Namespace::parse("-bad").is_err());
        assert!(Namespace::parse("Bad").is_err());
        assert!(Namespace::parse("a".repeat(64)).is_err());
    }
}
