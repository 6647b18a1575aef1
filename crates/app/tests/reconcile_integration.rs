//! Deployment tracker integration tests.
#![allow(missing_docs)]

mod common;

use benchkube_app::{delete_deployment, reconcile_sweep, submit_deployment};
use benchkube_domain::{
    DeploymentStatus, Namespace, ResourceKind, ResourcePhase, ResourceStatus,
};
use benchkube_ports::DeploymentStore as _;
use common::{JOB_YAML, World};

fn running_status() -> ResourceStatus {
    ResourceStatus {
        phase: ResourcePhase::Running,
        succeeded: Some(0),
        failed: Some(0),
        completions: Some(1),
        backoff_limit: Some(0),
        start_time_ms: Some(1),
        ..ResourceStatus::default()
    }
}

#[tokio::test]
async fn failing_job_progresses_pending_running_failed() {
    let world = World::new();
    let deps = world.deploy_deps();
    let namespace = Namespace::default_namespace();

    let deployment = submit_deployment(&world.ctx, &deps, JOB_YAML, namespace.clone())
        .await
        .expect("submit");
    assert_eq!(deployment.status, DeploymentStatus::Pending);

    // Tick 1: the job has started.
    world
        .gateway
        .push_status(ResourceKind::Job, "default", "latency-bench", running_status())
        .await;
    world
        .gateway
        .push_status(
            ResourceKind::Job,
            "default",
            "latency-bench",
            ResourceStatus {
                failed: Some(1),
                message: Some("pod latency-bench-x1 exited with code 1".into()),
                ..running_status()
            },
        )
        .await;

    world.clock.advance(30_000);
    reconcile_sweep(&world.ctx, &deps).await.expect("tick 1");
    let observed = world
        .deployment_store
        .get(&world.ctx, &deployment.deployment_id)
        .await
        .expect("after tick 1");
    assert_eq!(observed.status, DeploymentStatus::Running);

    // Tick 2: failed count exceeds backoffLimit (0), the job fails.
    world.clock.advance(30_000);
    reconcile_sweep(&world.ctx, &deps).await.expect("tick 2");
    let observed = world
        .deployment_store
        .get(&world.ctx, &deployment.deployment_id)
        .await
        .expect("after tick 2");
    assert_eq!(observed.status, DeploymentStatus::Failed);
    assert!(
        observed
            .last_error
            .as_deref()
            .is_some_and(|error| error.contains("exited with code 1")),
        "last_error carries the pod exit info"
    );
}

#[tokio::test]
async fn apply_delete_round_trip_clears_the_cluster() {
    let world = World::new();
    let deps = world.deploy_deps();
    let namespace = Namespace::default_namespace();

    let deployment = submit_deployment(&world.ctx, &deps, JOB_YAML, namespace)
        .await
        .expect("submit");
    assert!(
        world
            .gateway
            .is_live(ResourceKind::Job, "default", "latency-bench")
            .await
    );

    delete_deployment(&world.ctx, &deps, &deployment.deployment_id)
        .await
        .expect("delete");
    assert!(
        !world
            .gateway
            .is_live(ResourceKind::Job, "default", "latency-bench")
            .await,
        "delete must remove the resources named in the stored YAML"
    );
    let observed = world
        .deployment_store
        .get(&world.ctx, &deployment.deployment_id)
        .await
        .expect("record");
    assert_eq!(observed.status, DeploymentStatus::Deleted);

    // Idempotent.
    delete_deployment(&world.ctx, &deps, &deployment.deployment_id)
        .await
        .expect("second delete");
}

#[tokio::test]
async fn completed_jobs_never_regress() {
    let world = World::new();
    let deps = world.deploy_deps();
    let deployment = submit_deployment(
        &world.ctx,
        &deps,
        JOB_YAML,
        Namespace::default_namespace(),
    )
    .await
    .expect("submit");

    world
        .gateway
        .push_status(
            ResourceKind::Job,
            "default",
            "latency-bench",
            ResourceStatus {
                succeeded: Some(1),
                ..running_status()
            },
        )
        .await;
    world.clock.advance(30_000);
    reconcile_sweep(&world.ctx, &deps).await.expect("tick 1");

    // A later, stale observation claims the job is merely running.
    world
        .gateway
        .push_status(ResourceKind::Job, "default", "latency-bench", running_status())
        .await;
    world.clock.advance(30_000);
    reconcile_sweep(&world.ctx, &deps).await.expect("tick 2");
    world.clock.advance(30_000);
    reconcile_sweep(&world.ctx, &deps).await.expect("tick 3");

    let observed = world
        .deployment_store
        .get(&world.ctx, &deployment.deployment_id)
        .await
        .expect("record");
    assert_eq!(observed.status, DeploymentStatus::Completed);
}

#[tokio::test]
async fn failure_budget_pins_the_status() {
    let world = World::new();
    let mut deps = world.deploy_deps();
    deps.job_max_failures = 2;

    let deployment = submit_deployment(
        &world.ctx,
        &deps,
        JOB_YAML,
        Namespace::default_namespace(),
    )
    .await
    .expect("submit");

    // Two ticks observing pod failures below the backoff limit.
    let flaky = ResourceStatus {
        failed: Some(1),
        backoff_limit: Some(6),
        ..running_status()
    };
    world
        .gateway
        .push_status(ResourceKind::Job, "default", "latency-bench", flaky.clone())
        .await;
    world.clock.advance(30_000);
    reconcile_sweep(&world.ctx, &deps).await.expect("tick 1");

    world.clock.advance(30_000);
    reconcile_sweep(&world.ctx, &deps).await.expect("tick 2");

    let observed = world
        .deployment_store
        .get(&world.ctx, &deployment.deployment_id)
        .await
        .expect("record");
    assert_eq!(
        observed.status,
        DeploymentStatus::Failed,
        "budget exhausted: status pinned even though the job might recover"
    );
    assert_eq!(observed.failure_count, 2);
}

#[tokio::test]
async fn cluster_failure_marks_the_record_failed() {
    let world = World::new();
    let deps = world.deploy_deps();
    world.gateway.fail_next_apply();

    let error = submit_deployment(
        &world.ctx,
        &deps,
        JOB_YAML,
        Namespace::default_namespace(),
    )
    .await
    .expect_err("apply must fail");
    assert!(!error.is_cancelled());

    let records = world
        .deployment_store
        .list(&world.ctx, benchkube_ports::DeploymentFilter::default())
        .await
        .expect("list");
    assert_eq!(records.len(), 1, "the DB write precedes the cluster call");
    assert_eq!(records[0].status, DeploymentStatus::Failed);
    assert!(records[0].last_error.is_some());
}

#[tokio::test]
async fn vanished_resources_move_to_deleted() {
    let world = World::new();
    let deps = world.deploy_deps();
    let deployment = submit_deployment(
        &world.ctx,
        &deps,
        JOB_YAML,
        Namespace::default_namespace(),
    )
    .await
    .expect("submit");

    // Simulate out-of-band deletion.
    world
        .gateway
        .push_status(
            ResourceKind::Job,
            "default",
            "latency-bench",
            ResourceStatus {
                phase: ResourcePhase::NotFound,
                ..ResourceStatus::default()
            },
        )
        .await;
    world.clock.advance(30_000);
    reconcile_sweep(&world.ctx, &deps).await.expect("tick");

    let observed = world
        .deployment_store
        .get(&world.ctx, &deployment.deployment_id)
        .await
        .expect("record");
    assert_eq!(observed.status, DeploymentStatus::Deleted);
}
