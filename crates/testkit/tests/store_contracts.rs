//! Contract tests for the in-memory stores: the semantics the Mongo
//! implementations must match.
#![allow(missing_docs)]

use benchkube_domain::{
    FileId, FileType, ModifiedFile, ModifiedFileId, Project, ProjectId,
};
use benchkube_ports::{FileFilter, ManifestStore, UpsertFile};
use benchkube_shared::RequestContext;
use benchkube_testkit::InMemoryManifestStore;

fn project(id: &str) -> Project {
    Project {
        id: ProjectId::parse(id).expect("valid id"),
        name: id.into(),
        owner: "org".into(),
        repository: "repo".into(),
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

fn upsert(project: &str, path: &str, content: &[u8]) -> UpsertFile {
    UpsertFile {
        project_id: ProjectId::parse(project).expect("valid id"),
        path: path.into(),
        name: path.rsplit('/').next().unwrap_or(path).into(),
        content: content.to_vec(),
        file_type: FileType::Job,
        benchmark_type: "latency".into(),
        source_commit: "c1".into(),
        observed_at_ms: 1,
    }
}

fn override_file(id: &str, original: &FileId, name: &str) -> ModifiedFile {
    ModifiedFile {
        id: ModifiedFileId::parse(id).expect("valid id"),
        original_file_id: original.clone(),
        modified_name: name.into(),
        content: b"content".to_vec(),
        created_at_ms: 1,
        updated_at_ms: 1,
        orphaned: false,
    }
}

#[tokio::test]
async fn files_are_unique_per_project_and_path() {
    let store = InMemoryManifestStore::new();
    let ctx = RequestContext::new_request();

    let first = store
        .upsert_file(&ctx, upsert("p1", "jobs/a.yaml", b"v1"))
        .await
        .expect("first upsert");
    assert!(first.created);

    let second = store
        .upsert_file(&ctx, upsert("p1", "jobs/a.yaml", b"v2"))
        .await
        .expect("second upsert");
    assert!(!second.created);
    assert!(second.changed);
    assert_eq!(first.file_id, second.file_id, "id stable across updates");
    assert_eq!(store.file_count().await, 1);
}

#[tokio::test]
async fn duplicate_override_names_conflict() {
    let store = InMemoryManifestStore::new();
    let ctx = RequestContext::new_request();
    let file = store
        .upsert_file(&ctx, upsert("p1", "jobs/a.yaml", b"v1"))
        .await
        .expect("upsert");

    store
        .create_modified_file(&ctx, override_file("m1", &file.file_id, "custom.yaml"))
        .await
        .expect("first override");
    let duplicate = store
        .create_modified_file(&ctx, override_file("m2", &file.file_id, "custom.yaml"))
        .await;
    assert!(duplicate.is_err(), "duplicate (original, name) must conflict");

    // The same name on a different original is allowed.
    let other = store
        .upsert_file(&ctx, upsert("p1", "jobs/b.yaml", b"v1"))
        .await
        .expect("other upsert");
    store
        .create_modified_file(&ctx, override_file("m3", &other.file_id, "custom.yaml"))
        .await
        .expect("same name, different original");
}

#[tokio::test]
async fn deleting_a_file_orphans_but_keeps_overrides() {
    let store = InMemoryManifestStore::new();
    let ctx = RequestContext::new_request();
    let file = store
        .upsert_file(&ctx, upsert("p1", "jobs/a.yaml", b"v1"))
        .await
        .expect("upsert");
    store
        .create_modified_file(&ctx, override_file("m1", &file.file_id, "custom.yaml"))
        .await
        .expect("override");

    store.delete_file(&ctx, &file.file_id).await.expect("delete");

    let project_id = ProjectId::parse("p1").expect("valid id");
    let visible = store
        .list_files(&ctx, &project_id, FileFilter::default())
        .await
        .expect("list");
    assert!(visible.is_empty(), "orphaned files are hidden by default");

    let overrides = store
        .list_modified_files_for_original(&ctx, &file.file_id)
        .await
        .expect("overrides");
    assert_eq!(overrides.len(), 1, "overrides survive the delete");
    assert!(overrides[0].orphaned, "but are marked orphaned");
}

#[tokio::test]
async fn reset_project_removes_all_overrides() {
    let store = InMemoryManifestStore::new();
    let ctx = RequestContext::new_request();
    let file = store
        .upsert_file(&ctx, upsert("p1", "jobs/a.yaml", b"v1"))
        .await
        .expect("upsert");
    store
        .create_modified_file(&ctx, override_file("m1", &file.file_id, "one.yaml"))
        .await
        .expect("first");
    store
        .create_modified_file(&ctx, override_file("m2", &file.file_id, "two.yaml"))
        .await
        .expect("second");

    let project_id = ProjectId::parse("p1").expect("valid id");
    let deleted = store.reset_project(&ctx, &project_id).await.expect("reset");
    assert_eq!(deleted, 2);
    let remaining = store
        .list_modified_files_for_project(&ctx, &project_id)
        .await
        .expect("list");
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn deleting_a_project_cascades() {
    let store = InMemoryManifestStore::new();
    let ctx = RequestContext::new_request();
    store
        .create_project(&ctx, project("p1"))
        .await
        .expect("create");
    let file = store
        .upsert_file(&ctx, upsert("p1", "jobs/a.yaml", b"v1"))
        .await
        .expect("upsert");
    store
        .create_modified_file(&ctx, override_file("m1", &file.file_id, "one.yaml"))
        .await
        .expect("override");

    let project_id = ProjectId::parse("p1").expect("valid id");
    store
        .delete_project(&ctx, &project_id)
        .await
        .expect("delete project");

    assert!(store.get_file(&ctx, &file.file_id).await.is_err());
    assert!(
        store
            .get_modified_file(&ctx, &ModifiedFileId::parse("m1").expect("valid id"))
            .await
            .is_err()
    );
}
