//! Placement engine integration tests against the in-memory fakes.
#![allow(missing_docs)]

mod common;

use benchkube_app::{admit, deploy_vllm, reconcile_sweep};
use benchkube_domain::{AdmissionDecision, DeploymentStatus, ResourcePhase, ResourceStatus};
use common::{World, vllm_config};

async fn mark_running(world: &World, deployment_id: &benchkube_domain::DeploymentId) {
    // Drive the record to `running` through the reconciler.
    let record = {
        use benchkube_ports::VllmDeploymentStore as _;
        world
            .vllm_store
            .get(&world.ctx, deployment_id)
            .await
            .expect("vllm record")
    };
    world
        .gateway
        .push_status(
            record.deployment.primary_resource_type,
            record.deployment.namespace.as_str(),
            &record.deployment.primary_resource_name,
            ResourceStatus {
                phase: ResourcePhase::Running,
                ready_replicas: Some(1),
                ..ResourceStatus::default()
            },
        )
        .await;
    world.clock.advance(10);
    reconcile_sweep(&world.ctx, &world.deploy_deps())
        .await
        .expect("sweep");
}

#[tokio::test]
async fn identical_config_is_reused() {
    let world = World::new();
    let place = world.placement_deps();
    let deploy = world.deploy_deps();

    let config = vllm_config("microsoft/DialoGPT-medium", "nvidia.com/gpu", 1);
    let first = deploy_vllm(
        &world.ctx,
        &place,
        &deploy,
        config.clone(),
        benchkube_domain::Namespace::default_namespace(),
    )
    .await
    .expect("first deploy");
    assert!(!first.reused);
    mark_running(&world, &first.deployment_id).await;

    let applies_before = world.gateway.applies().await.len();
    let second = deploy_vllm(
        &world.ctx,
        &place,
        &deploy,
        config,
        benchkube_domain::Namespace::default_namespace(),
    )
    .await
    .expect("second deploy");

    assert!(second.reused, "identical config must reuse");
    assert_eq!(second.deployment_id, first.deployment_id);
    assert!(second.evicted.is_empty());
    assert_eq!(
        world.gateway.applies().await.len(),
        applies_before,
        "reuse must not create cluster resources"
    );
}

#[tokio::test]
async fn different_mig_slices_coexist() {
    let world = World::new();
    let place = world.placement_deps();
    let deploy = world.deploy_deps();
    let namespace = benchkube_domain::Namespace::default_namespace();

    let small = deploy_vllm(
        &world.ctx,
        &place,
        &deploy,
        vllm_config("m1", "nvidia.com/mig-3g.20gb", 1),
        namespace.clone(),
    )
    .await
    .expect("small deploy");
    mark_running(&world, &small.deployment_id).await;

    let large = deploy_vllm(
        &world.ctx,
        &place,
        &deploy,
        vllm_config("m2", "nvidia.com/mig-4g.24gb", 1),
        namespace,
    )
    .await
    .expect("large deploy");

    assert!(!large.reused);
    assert!(large.evicted.is_empty(), "different MIG slices coexist");

    use benchkube_ports::VllmDeploymentStore as _;
    let first = world
        .vllm_store
        .get(&world.ctx, &small.deployment_id)
        .await
        .expect("first record");
    assert_eq!(first.deployment.status, DeploymentStatus::Running);
}

#[tokio::test]
async fn gpu_conflict_evicts_the_existing_deployment() {
    let world = World::new();
    let place = world.placement_deps();
    let deploy = world.deploy_deps();
    let namespace = benchkube_domain::Namespace::default_namespace();

    let existing = deploy_vllm(
        &world.ctx,
        &place,
        &deploy,
        vllm_config("model-a", "nvidia.com/gpu", 1),
        namespace.clone(),
    )
    .await
    .expect("existing deploy");
    mark_running(&world, &existing.deployment_id).await;

    let candidate = deploy_vllm(
        &world.ctx,
        &place,
        &deploy,
        vllm_config("model-b", "nvidia.com/gpu", 1),
        namespace,
    )
    .await
    .expect("candidate deploy");

    assert!(!candidate.reused);
    assert_eq!(candidate.evicted, vec![existing.deployment_id.clone()]);

    use benchkube_ports::VllmDeploymentStore as _;
    let evicted = world
        .vllm_store
        .get(&world.ctx, &existing.deployment_id)
        .await
        .expect("evicted record");
    assert_eq!(evicted.deployment.status, DeploymentStatus::Deleted);
    let admitted = world
        .vllm_store
        .get(&world.ctx, &candidate.deployment_id)
        .await
        .expect("admitted record");
    assert_eq!(admitted.deployment.status, DeploymentStatus::Pending);
}

#[tokio::test]
async fn admission_is_idempotent_for_equal_fingerprints() {
    let world = World::new();
    let place = world.placement_deps();
    let deploy = world.deploy_deps();

    let config = vllm_config("m", "nvidia.com/gpu", 1);
    let outcome = deploy_vllm(
        &world.ctx,
        &place,
        &deploy,
        config.clone(),
        benchkube_domain::Namespace::default_namespace(),
    )
    .await
    .expect("deploy");

    let decision = admit(&world.ctx, &place, &config.fingerprint())
        .await
        .expect("admit");
    assert_eq!(decision, AdmissionDecision::Reuse(outcome.deployment_id));
}

#[tokio::test]
async fn zero_gpu_candidates_are_admitted_alongside() {
    let world = World::new();
    let place = world.placement_deps();
    let deploy = world.deploy_deps();
    let namespace = benchkube_domain::Namespace::default_namespace();

    let gpu = deploy_vllm(
        &world.ctx,
        &place,
        &deploy,
        vllm_config("model-a", "nvidia.com/gpu", 1),
        namespace.clone(),
    )
    .await
    .expect("gpu deploy");
    mark_running(&world, &gpu.deployment_id).await;

    let cpu = deploy_vllm(
        &world.ctx,
        &place,
        &deploy,
        vllm_config("model-b", "nvidia.com/gpu", 0),
        namespace,
    )
    .await
    .expect("cpu deploy");
    assert!(cpu.evicted.is_empty());
}
