//! Terminal sessions: live attached exec channels.

use crate::primitives::{DeploymentId, SessionId};
use serde::{Deserialize, Serialize};

/// Default idle timeout for terminal sessions (30 minutes).
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// Shells attempted when opening a session, in order.
pub const SHELL_CANDIDATES: [&str; 2] = ["/bin/bash", "/bin/sh"];

/// A live attached exec channel bridging a client stream and a container shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSession {
    /// Session identifier (UUID).
    pub session_id: SessionId,
    /// Deployment whose primary pod the session attaches to.
    pub deployment_id: DeploymentId,
    /// Resolved pod name.
    pub pod_name: Box<str>,
    /// Container name within the pod.
    pub container_name: Box<str>,
    /// Shell to run.
    pub shell: Box<str>,
    /// Creation timestamp (epoch ms).
    pub created_at_ms: u64,
    /// Last client or server activity (epoch ms); drives idle reaping.
    pub last_activity_at_ms: u64,
}

impl TerminalSession {
    /// Whether the session has been idle past `idle_timeout_ms` at `now`.
    #[must_use]
    pub const fn is_idle_at(&self, now_ms: u64, idle_timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_at_ms) > idle_timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_detection_uses_last_activity() {
        let session = TerminalSession {
            session_id: SessionId::parse("s1").expect("valid id"),
            deployment_id: DeploymentId::parse("d1").expect("valid id"),
            pod_name: "pod-0".into(),
            container_name: "main".into(),
            shell: "/bin/bash".into(),
            created_at_ms: 0,
            last_activity_at_ms: 1_000,
        };
        assert!(!session.is_idle_at(1_500, 1_000));
        assert!(session.is_idle_at(2_001, 1_000));
    }
}
