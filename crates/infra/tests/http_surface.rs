//! HTTP surface tests over the in-memory fakes.
#![allow(missing_docs)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use benchkube_app::TerminalBroker;
use benchkube_config::load_settings;
use benchkube_infra::{AppState, HealthProbe, SyncScheduler, deployer_router, eval_router, vllm_router};
use benchkube_ports::{BoxFuture, ManifestStore as _};
use benchkube_shared::{CancellationToken, ErrorEnvelope, Result};
use benchkube_testkit::{
    InMemoryDeploymentStore, InMemoryManifestStore, InMemorySourceClient, InMemoryTaskStore,
    InMemoryVllmStore, ManualClock, ScriptedClusterGateway,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tower::ServiceExt;

#[derive(Default)]
struct FakeHealth {
    down: AtomicBool,
}

impl HealthProbe for FakeHealth {
    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        let down = self.down.load(Ordering::SeqCst);
        Box::pin(async move {
            if down {
                Err(ErrorEnvelope::upstream("database unreachable"))
            } else {
                Ok(())
            }
        })
    }
}

fn state_with_health(health: Arc<FakeHealth>) -> Arc<AppState> {
    let env = [("MONGO_URL".to_string(), "mongodb://db/bench".to_string())]
        .into_iter()
        .collect();
    let settings = load_settings(&env).expect("settings");

    let clock: Arc<dyn benchkube_shared::Clock> = Arc::new(ManualClock::at(1_000));
    let gateway: Arc<dyn benchkube_ports::ClusterGateway> =
        Arc::new(ScriptedClusterGateway::new());
    let manifest_store: Arc<dyn benchkube_ports::ManifestStore> =
        Arc::new(InMemoryManifestStore::new());
    let deployment_store: Arc<dyn benchkube_ports::DeploymentStore> =
        Arc::new(InMemoryDeploymentStore::new());
    let vllm_store: Arc<dyn benchkube_ports::VllmDeploymentStore> =
        Arc::new(InMemoryVllmStore::new());
    let task_store: Arc<dyn benchkube_ports::EvaluationTaskStore> =
        Arc::new(InMemoryTaskStore::new());
    let source: Arc<dyn benchkube_ports::SourceClient> = Arc::new(InMemorySourceClient::new());

    let deploy_deps = benchkube_app::DeploymentDeps {
        store: Arc::clone(&deployment_store),
        vllm_store: Arc::clone(&vllm_store),
        gateway: Arc::clone(&gateway),
        clock: Arc::clone(&clock),
        job_max_failures: settings.job_max_failures,
        vllm_max_failures: settings.vllm_max_failures,
        reconcile_parallelism: 4,
    };
    let broker = Arc::new(TerminalBroker::new(
        Arc::clone(&gateway),
        deploy_deps,
        Arc::clone(&clock),
        settings.terminal_idle_timeout_ms(),
    ));
    let sync_scheduler = Arc::new(SyncScheduler::new(
        benchkube_app::SyncDeps {
            store: Arc::clone(&manifest_store),
            source: Arc::clone(&source),
            clock: Arc::clone(&clock),
        },
        Arc::clone(&clock),
    ));

    Arc::new(AppState {
        settings,
        clock,
        manifest_store,
        deployment_store,
        vllm_store,
        task_store,
        gateway,
        source,
        registry: None,
        broker,
        sync_scheduler,
        admission: Arc::new(tokio::sync::Mutex::new(())),
        health,
        shutdown: CancellationToken::new(),
    })
}

fn test_state() -> Arc<AppState> {
    state_with_health(Arc::new(FakeHealth::default()))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_reflects_database_reachability() {
    let health = Arc::new(FakeHealth::default());
    let router = deployer_router(state_with_health(Arc::clone(&health)));

    let ok = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(ok.status(), StatusCode::OK);

    health.down.store(true, Ordering::SeqCst);
    let down = router
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn project_crud_round_trips() {
    let router = deployer_router(test_state());

    let create = json_request(
        "POST",
        "/projects",
        json!({
            "name": "Latency Suite",
            "owner": "bench-org",
            "repository": "bench-manifests",
            "configFolder": "configs",
            "jobFolder": "jobs",
            "pollIntervalSeconds": 60
        }),
    );
    let created = router.clone().oneshot(create).await.expect("response");
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = body_json(created).await;
    assert_eq!(body["id"], "latency-suite");
    assert_eq!(body["reference"], "main");

    let fetched = router
        .clone()
        .oneshot(
            Request::get("/projects/latency-suite")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(fetched.status(), StatusCode::OK);

    // Duplicate name -> 409.
    let duplicate = json_request(
        "POST",
        "/projects",
        json!({
            "name": "Latency Suite",
            "owner": "bench-org",
            "repository": "bench-manifests",
            "configFolder": "configs",
            "jobFolder": "jobs",
            "pollIntervalSeconds": 60
        }),
    );
    let conflict = router.clone().oneshot(duplicate).await.expect("response");
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
    let body = body_json(conflict).await;
    assert_eq!(body["code"], "ERR_CORE_CONFLICT");

    let missing = router
        .oneshot(
            Request::get("/projects/nope")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_project_bodies_map_to_400() {
    let router = deployer_router(test_state());
    let short_interval = json_request(
        "POST",
        "/projects",
        json!({
            "name": "Suite",
            "owner": "org",
            "repository": "repo",
            "configFolder": "shared",
            "jobFolder": "shared",
            "pollIntervalSeconds": 60
        }),
    );
    let response = router.oneshot(short_interval).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deploy_creates_a_tracked_deployment() {
    let router = deployer_router(test_state());
    let yaml = concat!(
        "apiVersion: batch/v1\n",
        "kind: Job\n",
        "metadata:\n",
        "  name: smoke\n",
        "spec:\n",
        "  template:\n",
        "    spec:\n",
        "      containers:\n",
        "        - name: main\n",
        "          image: busybox\n",
    );

    let response = router
        .clone()
        .oneshot(json_request("POST", "/deploy", json!({ "yamlContent": yaml })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["primaryResourceType"], "job");
    assert_eq!(body["primaryResourceName"], "smoke");
    assert_eq!(body["status"], "pending");

    let listed = router
        .oneshot(Request::get("/deployments").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let body = body_json(listed).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn vllm_deploy_reports_reuse() {
    let router = vllm_router(test_state());
    let request_body = json!({
        "config": {
            "modelName": "microsoft/DialoGPT-medium",
            "gpuResourceType": "nvidia.com/gpu",
            "gpuResourceCount": 1,
            "port": 8000
        }
    });

    let first = router
        .clone()
        .oneshot(json_request("POST", "/deploy", request_body.clone()))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = body_json(first).await;
    assert_eq!(first_body["reused"], false);

    let second = router
        .oneshot(json_request("POST", "/deploy", request_body))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = body_json(second).await;
    assert_eq!(second_body["reused"], true);
    assert_eq!(second_body["deploymentId"], first_body["deploymentId"]);
}

#[tokio::test]
async fn unknown_vllm_fields_are_rejected() {
    let router = vllm_router(test_state());
    let response = router
        .oneshot(json_request(
            "POST",
            "/deploy",
            json!({
                "config": {
                    "modelName": "m",
                    "gpuResourceType": "nvidia.com/gpu",
                    "gpuResourceCount": 1,
                    "surprise": true
                }
            }),
        ))
        .await
        .expect("response");
    // Serde rejects unknown keys at the boundary.
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn evaluate_returns_task_and_schedule() {
    let state = test_state();
    // Seed a job file the scheduler can reference.
    let ctx = benchkube_shared::RequestContext::new_request();
    let outcome = state
        .manifest_store
        .upsert_file(
            &ctx,
            benchkube_ports::UpsertFile {
                project_id: benchkube_domain::ProjectId::parse("p1").expect("id"),
                path: "jobs/latency.yaml".into(),
                name: "latency.yaml".into(),
                content: b"apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: j\nspec:\n  template:\n    spec:\n      containers:\n        - name: c\n          image: i\n".to_vec(),
                file_type: benchkube_domain::FileType::Job,
                benchmark_type: "latency".into(),
                source_commit: "c1".into(),
                observed_at_ms: 0,
            },
        )
        .await
        .expect("seed");

    let router = eval_router(state);
    let response = router
        .oneshot(json_request(
            "POST",
            "/evaluate",
            json!({
                "projectId": "p1",
                "jobFileId": outcome.file_id.as_str(),
                "vllmModelEndpoint": "http://svc:8000"
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert!(body["taskId"].is_string());
    // Default delay is 30 minutes from the manual clock's 1000ms.
    assert_eq!(body["scheduledAtMs"], json!(1_000 + 30 * 60 * 1000));
}
