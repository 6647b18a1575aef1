//! Source file snapshots and user-authored overrides.

use crate::primitives::{FileId, ModifiedFileId, ProjectId};
use serde::{Deserialize, Serialize};

/// Kind of a mirrored file, derived from its containing folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Evaluation config (free-form JSON, mounted verbatim).
    Config,
    /// Benchmark job manifest (batch/v1 Job YAML).
    Job,
}

impl FileType {
    /// Stable string form used in filters and storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Job => "job",
        }
    }
}

/// An immutable snapshot of one source path at a known commit.
///
/// Unique per `(project_id, path)`. The id is stable across content changes
/// so overrides stay linked; content and commit are replaced in place when
/// the source changes. Files that vanish from the source are retained for
/// reproducibility and surfaced as stale on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// File identifier, derived from `(path, first-seen-commit)`.
    pub id: FileId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Path within the source repository.
    pub path: Box<str>,
    /// File name (final path segment).
    pub name: Box<str>,
    /// Raw content bytes; the store never validates the format.
    pub content: Vec<u8>,
    /// Config or job, derived from the containing folder.
    pub file_type: FileType,
    /// Benchmark suite this file belongs to (derived from the file name stem).
    pub benchmark_type: Box<str>,
    /// Commit SHA the content was fetched at.
    pub source_commit: Box<str>,
    /// Last time the poller observed this path in the source (epoch ms).
    pub last_observed_at_ms: u64,
    /// Soft-delete marker set by `DeleteFile`.
    #[serde(default)]
    pub orphaned: bool,
}

impl SourceFile {
    /// Whether this snapshot predates the given poll instant (stale on read).
    #[must_use]
    pub const fn is_stale_at(&self, last_successful_poll_ms: u64) -> bool {
        self.last_observed_at_ms < last_successful_poll_ms
    }
}

/// A user-authored override of one [`SourceFile`].
///
/// Multiple overrides may reference the same original; deleting the original
/// marks its overrides orphaned rather than deleting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedFile {
    /// Override identifier.
    pub id: ModifiedFileId,
    /// The original file this override shadows.
    pub original_file_id: FileId,
    /// Override name, unique per original file.
    pub modified_name: Box<str>,
    /// Raw content bytes.
    pub content: Vec<u8>,
    /// Creation timestamp (epoch ms).
    pub created_at_ms: u64,
    /// Last update timestamp (epoch ms).
    pub updated_at_ms: u64,
    /// Set when the original file was deleted.
    #[serde(default)]
    pub orphaned: bool,
}

/// Derive the benchmark type from a file name (`latency.yaml` -> `latency`).
#[must_use]
pub fn benchmark_type_from_name(name: &str) -> Box<str> {
    name.rsplit_once('.')
        .map_or(name, |(stem, _)| stem)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benchmark_type_strips_extension() {
        assert_eq!(benchmark_type_from_name("latency.yaml").as_ref(), "latency");
        assert_eq!(
            benchmark_type_from_name("throughput.v2.json").as_ref(),
            "throughput.v2"
        );
        assert_eq!(benchmark_type_from_name("noext").as_ref(), "noext");
    }

    #[test]
    fn staleness_compares_observation_time() {
        let file = SourceFile {
            id: FileId::derive("jobs/a.yaml", "c1"),
            project_id: ProjectId::parse("p1").expect("valid id"),
            path: "jobs/a.yaml".into(),
            name: "a.yaml".into(),
            content: Vec::new(),
            file_type: FileType::Job,
            benchmark_type: "a".into(),
            source_commit: "c1".into(),
            last_observed_at_ms: 100,
            orphaned: false,
        };
        assert!(!file.is_stale_at(100));
        assert!(file.is_stale_at(101));
    }
}
