//! HTTP adapter integration tests against mock servers.
#![allow(missing_docs)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use benchkube_adapters::{
    GithubSourceClient, GithubSourceConfig, MlflowRegistry, MlflowRegistryConfig,
};
use benchkube_ports::{ModelRegistry, SourceClient, SourceLocation};
use benchkube_shared::RequestContext;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn location() -> SourceLocation {
    SourceLocation {
        owner: "bench-org".into(),
        repository: "bench-manifests".into(),
        reference: "main".into(),
    }
}

fn client(server: &MockServer, token: Option<&str>) -> GithubSourceClient {
    GithubSourceClient::new(GithubSourceConfig {
        base_url: Url::parse(&format!("{}/", server.uri())).expect("mock url"),
        token: token.map(Into::into),
        requests_per_second: 1000,
    })
    .expect("client")
}

#[tokio::test]
async fn list_folder_returns_files_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/bench-org/bench-manifests/contents/jobs"))
        .and(query_param("ref", "main"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "latency.yaml", "path": "jobs/latency.yaml", "sha": "abc", "type": "file" },
            { "name": "archive", "path": "jobs/archive", "sha": "def", "type": "dir" }
        ])))
        .mount(&server)
        .await;

    let client = client(&server, Some("token-1"));
    let ctx = RequestContext::new_request();
    let entries = client
        .list_folder(&ctx, &location(), "jobs")
        .await
        .expect("listing");

    assert_eq!(entries.len(), 1, "directories are skipped");
    assert_eq!(entries[0].path.as_ref(), "jobs/latency.yaml");
    assert_eq!(entries[0].sha.as_ref(), "abc");
}

#[tokio::test]
async fn fetch_file_decodes_base64_content() {
    let server = MockServer::start().await;
    let encoded = BASE64.encode(b"kind: Job\n");
    Mock::given(method("GET"))
        .and(path("/repos/bench-org/bench-manifests/contents/jobs/latency.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "latency.yaml",
            "path": "jobs/latency.yaml",
            "sha": "abc123",
            "type": "file",
            "encoding": "base64",
            "content": format!("{encoded}\n")
        })))
        .mount(&server)
        .await;

    let client = client(&server, None);
    let ctx = RequestContext::new_request();
    let blob = client
        .fetch_file(&ctx, &location(), "jobs/latency.yaml")
        .await
        .expect("fetch");

    assert_eq!(blob.content, b"kind: Job\n");
    assert_eq!(blob.commit.as_ref(), "abc123");
}

#[tokio::test]
async fn missing_paths_surface_as_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server, None);
    let ctx = RequestContext::new_request();
    let error = client
        .fetch_file(&ctx, &location(), "jobs/gone.yaml")
        .await
        .expect_err("must fail");
    assert_eq!(error.code, benchkube_shared::ErrorCode::not_found());
}

#[tokio::test]
async fn rejected_credentials_surface_as_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client(&server, Some("expired"));
    let ctx = RequestContext::new_request();
    let error = client
        .list_folder(&ctx, &location(), "jobs")
        .await
        .expect_err("must fail");
    assert_eq!(error.code, benchkube_shared::ErrorCode::unauthorized());
}

#[tokio::test]
async fn put_file_creates_then_updates_with_sha() {
    let server = MockServer::start().await;
    // First head lookup: absent.
    Mock::given(method("GET"))
        .and(path("/repos/bench-org/bench-manifests/contents/applications/r1.yaml"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/repos/bench-org/bench-manifests/contents/applications/r1.yaml"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "commit": { "sha": "new-commit" }
        })))
        .mount(&server)
        .await;

    let client = client(&server, None);
    let ctx = RequestContext::new_request();
    let commit = client
        .put_file(&ctx, &location(), "applications/r1.yaml", b"a: 1\n", "mirror r1")
        .await
        .expect("put");
    assert_eq!(commit.as_ref(), "new-commit");
}

#[tokio::test]
async fn mlflow_versions_resolve_experiments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/mlflow/model-versions/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model_versions": [
                { "name": "llama", "version": "1", "run_id": "r1", "creation_timestamp": 1234 },
                { "name": "orphan", "version": "9" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/mlflow/runs/get"))
        .and(query_param("run_id", "r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "run": { "info": { "experiment_id": "exp-7" } }
        })))
        .mount(&server)
        .await;

    let registry = MlflowRegistry::new(MlflowRegistryConfig {
        base_url: Url::parse(&format!("{}/", server.uri())).expect("mock url"),
    })
    .expect("registry");
    let ctx = RequestContext::new_request();
    let versions = registry
        .list_model_versions(&ctx)
        .await
        .expect("versions");

    assert_eq!(versions.len(), 1, "versions without a run are skipped");
    assert_eq!(versions[0].run_id.as_ref(), "r1");
    assert_eq!(versions[0].experiment_id.as_ref(), "exp-7");
    assert_eq!(versions[0].created_at_ms, 1234);
}
