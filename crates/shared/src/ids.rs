//! Identifier generation for control-plane entities.
//!
//! Deployment ids are ULIDs so listings sort by creation time; session and
//! task ids are random UUIDs.

use ulid::Ulid;
use uuid::Uuid;

/// Generate a new deployment id (ULID, lowercase).
#[must_use]
pub fn new_deployment_id() -> Box<str> {
    Ulid::new().to_string().to_ascii_lowercase().into_boxed_str()
}

/// Generate a new terminal session id (UUID v4).
#[must_use]
pub fn new_session_id() -> Box<str> {
    Uuid::new_v4().to_string().into_boxed_str()
}

/// Generate a new evaluation task id (UUID v4).
#[must_use]
pub fn new_task_id() -> Box<str> {
    Uuid::new_v4().to_string().into_boxed_str()
}

/// Generate a new override (modified file) id (UUID v4).
#[must_use]
pub fn new_override_id() -> Box<str> {
    Uuid::new_v4().to_string().into_boxed_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_ids_are_unique_and_sortable() {
        let first = new_deployment_id();
        let second = new_deployment_id();
        assert_ne!(first, second);
        assert_eq!(first.len(), 26);
        assert!(first.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn session_ids_are_uuids() {
        let id = new_session_id();
        assert_eq!(id.matches('-').count(), 4);
    }
}
