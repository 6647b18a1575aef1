//! Registry-to-source bridge integration tests.
#![allow(missing_docs)]

mod common;

use benchkube_app::{BridgeDeps, bridge_tick};
use benchkube_ports::{RegisteredModelVersion, SourceLocation};
use benchkube_testkit::StaticRegistry;
use common::World;
use std::sync::Arc;

const TEMPLATE: &str = concat!(
    "global:\n",
    "  model_name: \"{model_name}\"\n",
    "  model_version: \"{model_version}\"\n",
    "  run_id: \"{run_id}\"\n",
    "  experiment_id: \"{experiment_id}\"\n",
    "  created: \"{timestamp}\"\n",
);

fn version(run_id: &str, model: &str, model_version: &str) -> RegisteredModelVersion {
    RegisteredModelVersion {
        run_id: run_id.into(),
        experiment_id: "exp-1".into(),
        model_name: model.into(),
        model_version: model_version.into(),
        created_at_ms: 0,
    }
}

async fn bridge_deps(world: &World, registry: Arc<StaticRegistry>) -> BridgeDeps {
    world.source.set_file("template/job.yaml", TEMPLATE.as_bytes()).await;
    BridgeDeps {
        registry,
        source: world.source.clone(),
        clock: world.clock.clone(),
        location: SourceLocation {
            owner: "bench-org".into(),
            repository: "bench-apps".into(),
            reference: "main".into(),
        },
    }
}

#[tokio::test]
async fn new_versions_are_mirrored_once() {
    let world = World::new();
    let registry = Arc::new(StaticRegistry::new());
    registry.push(version("r1", "llama", "1")).await;
    let deps = bridge_deps(&world, registry).await;

    let first = bridge_tick(&world.ctx, &deps).await.expect("tick 1");
    assert_eq!(first.mirrored, 1);
    let mirrored = world
        .source
        .content_at("applications/r1.yaml")
        .await
        .expect("mirrored file");
    let text = String::from_utf8(mirrored).expect("utf-8");
    assert!(text.contains("model_name: \"llama\""));
    assert!(text.contains("run_id: \"r1\""));

    // State is derived from the repository: the second tick is a no-op.
    let second = bridge_tick(&world.ctx, &deps).await.expect("tick 2");
    assert_eq!(second.mirrored, 0);
    assert_eq!(second.updated, 0);
}

#[tokio::test]
async fn changed_versions_update_the_global_block() {
    let world = World::new();
    let registry = Arc::new(StaticRegistry::new());
    registry.push(version("r1", "llama", "1")).await;
    let deps = bridge_deps(&world, registry.clone()).await;
    bridge_tick(&world.ctx, &deps).await.expect("initial mirror");

    // The registry now reports version 2 for the same run.
    let bumped = Arc::new(StaticRegistry::new());
    bumped.push(version("r1", "llama", "2")).await;
    let deps = bridge_deps(&world, bumped).await;

    let outcome = bridge_tick(&world.ctx, &deps).await.expect("update tick");
    assert_eq!(outcome.mirrored, 0);
    assert_eq!(outcome.updated, 1);

    let text = String::from_utf8(
        world
            .source
            .content_at("applications/r1.yaml")
            .await
            .expect("file"),
    )
    .expect("utf-8");
    assert!(text.contains("model_version: '2'") || text.contains("model_version: \"2\""),
        "global block carries the new version: {text}");
    assert!(text.contains("run_id:"), "other keys survive the update");
}

#[tokio::test]
async fn empty_registry_is_a_noop() {
    let world = World::new();
    let deps = bridge_deps(&world, Arc::new(StaticRegistry::new())).await;
    let outcome = bridge_tick(&world.ctx, &deps).await.expect("tick");
    assert_eq!(outcome, benchkube_app::BridgeOutcome::default());
}
