//! Projects: named bindings to an external versioned source location.

use crate::primitives::ProjectId;
use benchkube_shared::ErrorEnvelope;
use serde::{Deserialize, Serialize};

/// Minimum allowed poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 10_000;

/// A named binding to an external source location.
///
/// The poller mirrors two folders (`config_folder`, `job_folder`) from the
/// source into the manifest store. The poller never mutates a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier.
    pub id: ProjectId,
    /// Human-readable project name.
    pub name: Box<str>,
    /// Owner (organisation or user) of the source repository.
    pub owner: Box<str>,
    /// Source repository name.
    pub repository: Box<str>,
    /// Branch or ref to poll.
    pub reference: Box<str>,
    /// Folder holding evaluation config files.
    pub config_folder: Box<str>,
    /// Folder holding benchmark job manifests.
    pub job_folder: Box<str>,
    /// Poll interval in milliseconds (>= 10s).
    pub poll_interval_ms: u64,
    /// Reference to the credential used for source access (never the secret itself).
    pub credentials_ref: Option<Box<str>>,
    /// Creation timestamp (epoch ms).
    pub created_at_ms: u64,
    /// Last metadata update (epoch ms).
    pub updated_at_ms: u64,
    /// Outcome of the most recent poll tick, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll: Option<PollOutcome>,
}

impl Project {
    /// Validate the project invariants.
    ///
    /// The two mirrored folders must differ (file type is derived from the
    /// containing folder) and the poll interval has a lower bound.
    pub fn validate(&self) -> Result<(), ErrorEnvelope> {
        if self.config_folder == self.job_folder {
            return Err(ErrorEnvelope::invalid(
                "configFolder and jobFolder must differ",
            ));
        }
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(ErrorEnvelope::invalid(format!(
                "pollInterval must be at least {}s",
                MIN_POLL_INTERVAL_MS / 1000
            )));
        }
        if self.owner.trim().is_empty() || self.repository.trim().is_empty() {
            return Err(ErrorEnvelope::invalid("owner and repository are required"));
        }
        Ok(())
    }
}

/// Result of one poll tick, recorded on the project for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    /// When the tick finished (epoch ms).
    pub finished_at_ms: u64,
    /// Files listed in the source during this tick.
    pub files_seen: u32,
    /// Files whose content or commit changed.
    pub files_changed: u32,
    /// Consecutive failures so far (0 after a successful tick).
    pub consecutive_failures: u32,
    /// Error from the tick, when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Box<str>>,
}

impl PollOutcome {
    /// Outcome for a successful tick.
    #[must_use]
    pub const fn success(finished_at_ms: u64, files_seen: u32, files_changed: u32) -> Self {
        Self {
            finished_at_ms,
            files_seen,
            files_changed,
            consecutive_failures: 0,
            error: None,
        }
    }

    /// Outcome for a failed tick, carrying the running failure count.
    #[must_use]
    pub const fn failure(finished_at_ms: u64, consecutive_failures: u32, error: Box<str>) -> Self {
        Self {
            finished_at_ms,
            files_seen: 0,
            files_changed: 0,
            consecutive_failures,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project {
            id: ProjectId::parse("p1").expect("valid id"),
            name: "latency-suite".into(),
            owner: "bench-org".into(),
            repository: "bench-manifests".into(),
            reference: "main".into(),
            config_folder: "configs".into(),
            job_folder: "jobs".into(),
            poll_interval_ms: 60_000,
            credentials_ref: None,
            created_at_ms: 0,
            updated_at_ms: 0,
            last_poll: None,
        }
    }

    #[test]
    fn valid_project_passes() {
        assert!(project().validate().is_ok());
    }

    #[test]
    fn folders_must_differ() {
        let mut bad = project();
        bad.job_folder = bad.config_folder.clone();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn poll_interval_has_floor() {
        let mut bad = project();
        bad.poll_interval_ms = 9_999;
        assert!(bad.validate().is_err());
    }
}
