//! Terminal broker integration tests.
#![allow(missing_docs)]

mod common;

use benchkube_app::{TerminalBroker, TerminalInput, TerminalOutput, submit_deployment};
use benchkube_domain::Namespace;
use benchkube_ports::PodInfo;
use common::{JOB_YAML, World};
use std::sync::Arc;
use std::time::Duration;

async fn broker_with_deployment(world: &World) -> (TerminalBroker, benchkube_domain::DeploymentId) {
    let deps = world.deploy_deps();
    let deployment = submit_deployment(&world.ctx, &deps, JOB_YAML, Namespace::default_namespace())
        .await
        .expect("submit");
    world
        .gateway
        .set_pods(
            "job-name=latency-bench",
            vec![PodInfo {
                name: "latency-bench-x1".into(),
                phase: "Running".into(),
                ready: true,
                started_at_ms: Some(10),
            }],
        )
        .await;
    let broker = TerminalBroker::new(
        world.gateway.clone(),
        deps,
        world.clock.clone(),
        30 * 60 * 1000,
    );
    (broker, deployment.deployment_id)
}

#[tokio::test]
async fn only_one_client_per_session() {
    let world = World::new();
    let (broker, deployment_id) = broker_with_deployment(&world).await;

    let session = broker
        .create_session(&world.ctx, &deployment_id, None, None)
        .await
        .expect("create session");

    let attached = broker
        .attach(&world.ctx, &session.session_id)
        .await
        .expect("first attach");

    let refused = broker.attach(&world.ctx, &session.session_id).await;
    assert!(
        refused.is_err(),
        "a second client on the same session is refused"
    );
    drop(attached);
}

#[tokio::test]
async fn multiple_sessions_per_deployment_are_allowed() {
    let world = World::new();
    let (broker, deployment_id) = broker_with_deployment(&world).await;

    let first = broker
        .create_session(&world.ctx, &deployment_id, None, None)
        .await
        .expect("first session");
    let second = broker
        .create_session(&world.ctx, &deployment_id, None, None)
        .await
        .expect("second session");
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(broker.session_count().await, 2);
}

#[tokio::test]
async fn input_round_trips_through_the_exec_channel() {
    let world = World::new();
    let (broker, deployment_id) = broker_with_deployment(&world).await;

    let session = broker
        .create_session(&world.ctx, &deployment_id, None, None)
        .await
        .expect("create session");
    let mut attached = broker
        .attach(&world.ctx, &session.session_id)
        .await
        .expect("attach");

    attached
        .input
        .send(TerminalInput::Data(bytes::Bytes::from_static(b"ls\n")))
        .await
        .expect("send input");

    // The scripted gateway loops stdin back to stdout.
    let output = tokio::time::timeout(Duration::from_secs(1), attached.output.recv())
        .await
        .expect("output within deadline")
        .expect("channel open");
    assert_eq!(output, TerminalOutput::Data(bytes::Bytes::from_static(b"ls\n")));
}

#[tokio::test]
async fn idle_sessions_are_reaped() {
    let world = World::new();
    let (broker, deployment_id) = broker_with_deployment(&world).await;

    broker
        .create_session(&world.ctx, &deployment_id, None, None)
        .await
        .expect("create session");
    assert_eq!(broker.session_count().await, 1);

    assert_eq!(broker.reap_idle().await, 0, "fresh sessions survive");
    world.clock.advance(31 * 60 * 1000);
    assert_eq!(broker.reap_idle().await, 1, "idle sessions are closed");
    assert_eq!(broker.session_count().await, 0);
}

#[tokio::test]
async fn shutdown_closes_every_session() {
    let world = World::new();
    let (broker, deployment_id) = broker_with_deployment(&world).await;
    let broker = Arc::new(broker);

    for _ in 0..3 {
        broker
            .create_session(&world.ctx, &deployment_id, None, None)
            .await
            .expect("create session");
    }
    assert_eq!(broker.session_count().await, 3);
    broker.shutdown().await;
    assert_eq!(broker.session_count().await, 0);
}
