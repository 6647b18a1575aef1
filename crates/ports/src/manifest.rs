//! Manifest store boundary contract.

use crate::BoxFuture;
use benchkube_domain::{
    FileId, FileType, ModifiedFile, ModifiedFileId, PollOutcome, Project, ProjectId, SourceFile,
};
use benchkube_shared::{RequestContext, Result};

/// Input for a file upsert from the source poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertFile {
    /// Owning project.
    pub project_id: ProjectId,
    /// Path within the source repository.
    pub path: Box<str>,
    /// File name (final path segment).
    pub name: Box<str>,
    /// Raw content bytes.
    pub content: Vec<u8>,
    /// Config or job, derived from the containing folder.
    pub file_type: FileType,
    /// Benchmark suite label.
    pub benchmark_type: Box<str>,
    /// Commit SHA the content was fetched at.
    pub source_commit: Box<str>,
    /// Observation instant (epoch ms).
    pub observed_at_ms: u64,
}

/// Outcome of a file upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// The (stable) file id.
    pub file_id: FileId,
    /// True when a new file record was created.
    pub created: bool,
    /// True when the content or commit changed.
    pub changed: bool,
}

/// Filter for file listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    /// Restrict to one file type.
    pub file_type: Option<FileType>,
    /// Restrict to one benchmark type.
    pub benchmark_type: Option<Box<str>>,
    /// Include soft-deleted files.
    pub include_orphaned: bool,
}

/// Boundary contract for projects, files, and overrides.
///
/// Content is opaque bytes; the store never refuses a write based on format.
/// Upserts for the same `(project, path)` are serialized by the
/// implementation.
pub trait ManifestStore: Send + Sync {
    /// Create a project; `conflict` when the id is taken.
    fn create_project<'a>(
        &'a self,
        ctx: &'a RequestContext,
        project: Project,
    ) -> BoxFuture<'a, Result<()>>;

    /// Fetch a project; `not_found` when absent.
    fn get_project<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<Project>>;

    /// List all projects.
    fn list_projects<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, Result<Vec<Project>>>;

    /// Replace project metadata; the poller never calls this.
    fn update_project<'a>(
        &'a self,
        ctx: &'a RequestContext,
        project: Project,
    ) -> BoxFuture<'a, Result<()>>;

    /// Delete a project, cascading to its files and overrides.
    fn delete_project<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<()>>;

    /// Record the outcome of a poll tick on the project.
    fn record_poll_outcome<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a ProjectId,
        outcome: PollOutcome,
    ) -> BoxFuture<'a, Result<()>>;

    /// Create or update the file at `(project, path)`, preserving its id.
    fn upsert_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        input: UpsertFile,
    ) -> BoxFuture<'a, Result<UpsertOutcome>>;

    /// List files for a project.
    fn list_files<'a>(
        &'a self,
        ctx: &'a RequestContext,
        project_id: &'a ProjectId,
        filter: FileFilter,
    ) -> BoxFuture<'a, Result<Vec<SourceFile>>>;

    /// Fetch a file; `not_found` when absent.
    fn get_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a FileId,
    ) -> BoxFuture<'a, Result<SourceFile>>;

    /// Soft-delete a file: mark it and its overrides orphaned.
    fn delete_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a FileId,
    ) -> BoxFuture<'a, Result<()>>;

    /// Create an override; `conflict` on duplicate `(original, name)`.
    fn create_modified_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        modified: ModifiedFile,
    ) -> BoxFuture<'a, Result<()>>;

    /// Fetch an override; `not_found` when absent.
    fn get_modified_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a ModifiedFileId,
    ) -> BoxFuture<'a, Result<ModifiedFile>>;

    /// List overrides for all files of a project.
    fn list_modified_files_for_project<'a>(
        &'a self,
        ctx: &'a RequestContext,
        project_id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<Vec<ModifiedFile>>>;

    /// List overrides referencing one original file.
    fn list_modified_files_for_original<'a>(
        &'a self,
        ctx: &'a RequestContext,
        original: &'a FileId,
    ) -> BoxFuture<'a, Result<Vec<ModifiedFile>>>;

    /// Replace an override's content.
    fn update_modified_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a ModifiedFileId,
        content: Vec<u8>,
        updated_at_ms: u64,
    ) -> BoxFuture<'a, Result<()>>;

    /// Delete an override.
    fn delete_modified_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a ModifiedFileId,
    ) -> BoxFuture<'a, Result<()>>;

    /// Delete all overrides for a project.
    fn reset_project<'a>(
        &'a self,
        ctx: &'a RequestContext,
        project_id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<u64>>;
}

/// Optional lint hook callers may run before surfacing content to users.
///
/// Never gates a write: the store persists whatever bytes it is given.
pub fn parse_manifest(file_type: FileType, bytes: &[u8]) -> Result<(), benchkube_shared::ErrorEnvelope> {
    match file_type {
        FileType::Job => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| benchkube_shared::ErrorEnvelope::invalid("job file is not UTF-8"))?;
            if text.trim().is_empty() {
                return Err(benchkube_shared::ErrorEnvelope::invalid("job file is empty"));
            }
            Ok(())
        },
        FileType::Config => {
            serde_json::from_slice::<serde_json::Value>(bytes)
                .map_err(|error| {
                    benchkube_shared::ErrorEnvelope::invalid(format!(
                        "config file is not valid JSON: {error}"
                    ))
                })
                .map(|_| ())
        },
    }
}
