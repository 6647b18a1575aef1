//! Source poller integration tests.
#![allow(missing_docs)]

mod common;

use benchkube_app::poll_project_once;
use benchkube_ports::{FileFilter, ManifestStore as _};
use common::World;

#[tokio::test]
async fn poll_mirrors_both_folders() {
    let world = World::new();
    let deps = world.sync_deps();
    let project = world.project();

    world.source.set_file("jobs/latency.yaml", common::JOB_YAML.as_bytes()).await;
    world.source.set_file("jobs/throughput.yaml", b"kind: Job").await;
    world.source.set_file("configs/latency.json", br#"{"n": 1}"#).await;
    // Nested paths are not listed as direct children.
    world.source.set_file("jobs/archive/old.yaml", b"kind: Job").await;

    let outcome = poll_project_once(&world.ctx, &deps, &project, 0).await;
    assert_eq!(outcome.files_seen, 3);
    assert_eq!(outcome.files_changed, 3);
    assert_eq!(outcome.consecutive_failures, 0);

    let files = world
        .manifest_store
        .list_files(&world.ctx, &project.id, FileFilter::default())
        .await
        .expect("list files");
    assert_eq!(files.len(), 3);
    let job = files
        .iter()
        .find(|file| file.path.as_ref() == "jobs/latency.yaml")
        .expect("job file present");
    assert_eq!(job.benchmark_type.as_ref(), "latency");
    assert_eq!(job.file_type, benchkube_domain::FileType::Job);
}

#[tokio::test]
async fn unchanged_ref_polls_are_idempotent() {
    let world = World::new();
    let deps = world.sync_deps();
    let project = world.project();
    world.source.set_file("jobs/latency.yaml", common::JOB_YAML.as_bytes()).await;

    let first = poll_project_once(&world.ctx, &deps, &project, 0).await;
    assert_eq!(first.files_changed, 1);

    let second = poll_project_once(&world.ctx, &deps, &project, 0).await;
    assert_eq!(second.files_seen, 1);
    assert_eq!(second.files_changed, 0, "second poll of an unchanged ref");
    assert_eq!(world.manifest_store.file_count().await, 1);
}

#[tokio::test]
async fn file_ids_survive_content_changes() {
    let world = World::new();
    let deps = world.sync_deps();
    let project = world.project();
    world.source.set_file("jobs/latency.yaml", b"v1").await;
    poll_project_once(&world.ctx, &deps, &project, 0).await;

    let before = world
        .manifest_store
        .list_files(&world.ctx, &project.id, FileFilter::default())
        .await
        .expect("list before");

    world.source.set_file("jobs/latency.yaml", b"v2").await;
    let outcome = poll_project_once(&world.ctx, &deps, &project, 0).await;
    assert_eq!(outcome.files_changed, 1);

    let after = world
        .manifest_store
        .list_files(&world.ctx, &project.id, FileFilter::default())
        .await
        .expect("list after");
    assert_eq!(after.len(), 1, "content change must not create a new file");
    assert_eq!(before[0].id, after[0].id, "id is stable across changes");
    assert_eq!(after[0].content, b"v2");
}

#[tokio::test]
async fn vanished_files_are_retained() {
    let world = World::new();
    let deps = world.sync_deps();
    let project = world.project();
    world.source.set_file("jobs/latency.yaml", b"v1").await;
    poll_project_once(&world.ctx, &deps, &project, 0).await;

    world.source.remove_file("jobs/latency.yaml").await;
    world.clock.advance(60_000);
    let outcome = poll_project_once(&world.ctx, &deps, &project, 0).await;
    assert_eq!(outcome.files_seen, 0);

    let files = world
        .manifest_store
        .list_files(&world.ctx, &project.id, FileFilter::default())
        .await
        .expect("list");
    assert_eq!(files.len(), 1, "archive semantics: vanished files survive");
    assert!(
        files[0].is_stale_at(outcome.finished_at_ms),
        "vanished files surface as stale"
    );
}

#[tokio::test]
async fn failures_are_counted_and_recorded() {
    let world = World::new();
    let deps = world.sync_deps();
    let project = world.project();
    world.manifest_store
        .create_project(&world.ctx, project.clone())
        .await
        .expect("create project");

    world.source.set_fail_listing(true);
    let first = poll_project_once(&world.ctx, &deps, &project, 0).await;
    assert_eq!(first.consecutive_failures, 1);
    assert!(first.error.is_some());

    let second = poll_project_once(&world.ctx, &deps, &project, first.consecutive_failures).await;
    assert_eq!(second.consecutive_failures, 2);

    // Recovery resets the failure count.
    world.source.set_fail_listing(false);
    let third = poll_project_once(&world.ctx, &deps, &project, second.consecutive_failures).await;
    assert_eq!(third.consecutive_failures, 0);

    let stored = world
        .manifest_store
        .get_project(&world.ctx, &project.id)
        .await
        .expect("project");
    assert_eq!(
        stored.last_poll.map(|outcome| outcome.consecutive_failures),
        Some(0)
    );
}
