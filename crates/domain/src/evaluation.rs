//! Scheduled evaluation tasks and their state machine.

use crate::primitives::{DeploymentId, FileId, ModifiedFileId, ProjectId, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Retry backoff base for failed submissions (60 s).
pub const EVALUATION_BACKOFF_BASE_MS: u64 = 60_000;
/// Retry backoff cap for failed submissions (10 min).
pub const EVALUATION_BACKOFF_CAP_MS: u64 = 600_000;

/// State of an evaluation task.
///
/// Transitions are monotonic: `scheduled -> firing`, `firing -> completed |
/// failed`, `firing -> scheduled` (retry re-arm), `scheduled -> cancelled`.
/// Terminal states (`completed`, `failed`, `cancelled`) are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for `scheduled_at`.
    Scheduled,
    /// Claimed by the sweeper; submission in progress.
    Firing,
    /// Submission succeeded.
    Completed,
    /// Retry budget exhausted.
    Failed,
    /// Cancelled before firing.
    Cancelled,
}

impl TaskState {
    /// Whether a transition from `self` to `next` is legal.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Firing | Self::Cancelled)
                | (Self::Firing, Self::Completed | Self::Failed | Self::Scheduled)
        )
    }

    /// Terminal states are absorbing.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable string form used in storage and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Firing => "firing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A deferred, possibly retried request to run a benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationTask {
    /// Task identifier.
    pub task_id: TaskId,
    /// Project the job and config files belong to.
    pub project_id: ProjectId,
    /// Benchmark suite label.
    pub benchmark_type: Box<str>,
    /// Job manifest to run.
    pub job_file_id: FileId,
    /// Optional evaluation config to mount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file_id: Option<FileId>,
    /// Optional override to use instead of the original job file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_override_id: Option<ModifiedFileId>,
    /// Model endpoint injected into the job as `VLLM_MODEL_ENDPOINT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_endpoint: Option<Box<str>>,
    /// Human-readable run name.
    pub name: Box<str>,
    /// Instant the task becomes due (epoch ms).
    pub scheduled_at_ms: u64,
    /// Current state.
    pub state: TaskState,
    /// Submission attempts so far.
    pub attempts: u32,
    /// Most recent submission error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<Box<str>>,
    /// Deployment created by a successful firing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<DeploymentId>,
    /// Creation timestamp (epoch ms).
    pub created_at_ms: u64,
    /// Last state write (epoch ms).
    pub updated_at_ms: u64,
}

impl EvaluationTask {
    /// Whether the task is due at `now` (claimable by the sweeper).
    #[must_use]
    pub fn is_due_at(&self, now_ms: u64) -> bool {
        self.state == TaskState::Scheduled && self.scheduled_at_ms <= now_ms
    }
}

/// Backoff before retry number `attempt` (1-indexed):
/// `min(base * 2^(attempt-1), cap)`.
#[must_use]
pub const fn evaluation_backoff_ms(attempt: u32) -> u64 {
    let pow = attempt.saturating_sub(1);
    let pow = if pow > 30 { 30 } else { pow };
    let delay = EVALUATION_BACKOFF_BASE_MS.saturating_mul(1u64 << pow);
    if delay > EVALUATION_BACKOFF_CAP_MS {
        EVALUATION_BACKOFF_CAP_MS
    } else {
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_is_monotonic() {
        use TaskState::{Cancelled, Completed, Failed, Firing, Scheduled};
        assert!(Scheduled.can_transition_to(Firing));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Firing.can_transition_to(Completed));
        assert!(Firing.can_transition_to(Failed));
        assert!(Firing.can_transition_to(Scheduled), "retry re-arm");
        assert!(!Completed.can_transition_to(Scheduled));
        assert!(!Cancelled.can_transition_to(Firing));
        assert!(!Failed.can_transition_to(Scheduled));
    }

    #[test]
    fn backoff_doubles_to_cap() {
        assert_eq!(evaluation_backoff_ms(1), 60_000);
        assert_eq!(evaluation_backoff_ms(2), 120_000);
        assert_eq!(evaluation_backoff_ms(3), 240_000);
        assert_eq!(evaluation_backoff_ms(4), 480_000);
        assert_eq!(evaluation_backoff_ms(5), 600_000);
        assert_eq!(evaluation_backoff_ms(30), 600_000);
    }
}
