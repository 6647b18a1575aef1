//! Source poller tick: mirror a project's folders into the manifest store.

use benchkube_domain::{FileType, PollOutcome, Project};
use benchkube_ports::{ManifestStore, SourceClient, SourceLocation, UpsertFile};
use benchkube_shared::{Clock, RequestContext, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Dependencies for the source poller.
#[derive(Clone)]
pub struct SyncDeps {
    /// Manifest store receiving the mirrored files.
    pub store: Arc<dyn ManifestStore>,
    /// Versioned-source client.
    pub source: Arc<dyn SourceClient>,
    /// Clock for observation timestamps.
    pub clock: Arc<dyn Clock>,
}

/// Run one poll tick for a project and record its outcome.
///
/// Archive semantics: files missing from the source are not deleted, they
/// simply stop being observed (and surface as stale on read). Failures are
/// recorded on the project with a running failure count; the loop runner
/// uses that count for backoff. Errors never escape this function.
pub async fn poll_project_once(
    ctx: &RequestContext,
    deps: &SyncDeps,
    project: &Project,
    previous_failures: u32,
) -> PollOutcome {
    let outcome = match sync_project(ctx, deps, project).await {
        Ok((seen, changed)) => {
            info!(
                project = %project.id,
                files_seen = seen,
                files_changed = changed,
                "sync.tick completed"
            );
            PollOutcome::success(deps.clock.now_ms(), seen, changed)
        },
        Err(error) => {
            let failures = previous_failures.saturating_add(1);
            warn!(
                project = %project.id,
                consecutive_failures = failures,
                error = %error,
                "sync.tick failed"
            );
            PollOutcome::failure(
                deps.clock.now_ms(),
                failures,
                error.to_string().into_boxed_str(),
            )
        },
    };

    if let Err(error) = deps
        .store
        .record_poll_outcome(ctx, &project.id, outcome.clone())
        .await
    {
        warn!(project = %project.id, error = %error, "sync.outcome write failed");
    }
    outcome
}

async fn sync_project(
    ctx: &RequestContext,
    deps: &SyncDeps,
    project: &Project,
) -> Result<(u32, u32)> {
    let location = SourceLocation {
        owner: project.owner.clone(),
        repository: project.repository.clone(),
        reference: project.reference.clone(),
    };

    let mut seen = 0u32;
    let mut changed = 0u32;
    for (folder, file_type) in [
        (&project.config_folder, FileType::Config),
        (&project.job_folder, FileType::Job),
    ] {
        ctx.ensure_not_cancelled("sync.folder")?;
        let entries = deps.source.list_folder(ctx, &location, folder).await?;
        for entry in entries {
            ctx.ensure_not_cancelled("sync.file")?;
            let blob = deps.source.fetch_file(ctx, &location, &entry.path).await?;
            let outcome = deps
                .store
                .upsert_file(
                    ctx,
                    UpsertFile {
                        project_id: project.id.clone(),
                        path: entry.path.clone(),
                        name: entry.name.clone(),
                        content: blob.content,
                        file_type,
                        benchmark_type: benchkube_domain::files::benchmark_type_from_name(
                            &entry.name,
                        ),
                        source_commit: blob.commit,
                        observed_at_ms: deps.clock.now_ms(),
                    },
                )
                .await?;
            seen = seen.saturating_add(1);
            if outcome.changed || outcome.created {
                changed = changed.saturating_add(1);
            }
        }
    }
    Ok((seen, changed))
}
