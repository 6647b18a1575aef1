//! MLflow-style model registry client.

use benchkube_ports::{BoxFuture, ModelRegistry, RegisteredModelVersion};
use benchkube_shared::{
    DEFAULT_CALL_TIMEOUT, ErrorClass, ErrorEnvelope, RequestContext, Result, bounded_call,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;

/// Configuration for the registry client.
#[derive(Debug, Clone)]
pub struct MlflowRegistryConfig {
    /// API base URL (e.g. `http://mlflow:5000`).
    pub base_url: Url,
}

/// Registry client over the MLflow REST API.
#[derive(Debug, Clone)]
pub struct MlflowRegistry {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
}

#[derive(Debug, Deserialize)]
struct ModelVersion {
    name: String,
    version: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    creation_timestamp: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: Run,
}

#[derive(Debug, Deserialize)]
struct Run {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    experiment_id: String,
}

impl MlflowRegistry {
    /// Build a client from configuration.
    pub fn new(config: MlflowRegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_CALL_TIMEOUT)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    benchkube_shared::ErrorCode::new("registry", "client_init_failed"),
                    format!("failed to build registry client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;
        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|error| ErrorEnvelope::invalid(format!("invalid registry URL: {error}")))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        ctx: &RequestContext,
        url: Url,
        operation: &'static str,
    ) -> Result<T> {
        let request = self.client.get(url);
        let send = async {
            let response = request.send().await.map_err(|error| {
                ErrorEnvelope::upstream(format!("registry unreachable: {error}"))
            })?;
            if !response.status().is_success() {
                return Err(ErrorEnvelope::upstream(format!(
                    "registry returned {}",
                    response.status()
                )));
            }
            response.json::<T>().await.map_err(|error| {
                ErrorEnvelope::upstream(format!("registry returned malformed JSON: {error}"))
            })
        };
        bounded_call(ctx, operation, send).await
    }

    async fn experiment_for_run(
        &self,
        ctx: &RequestContext,
        run_id: &str,
        cache: &mut BTreeMap<String, String>,
    ) -> Result<String> {
        if let Some(experiment_id) = cache.get(run_id) {
            return Ok(experiment_id.clone());
        }
        let url = self.endpoint(&format!("api/2.0/mlflow/runs/get?run_id={run_id}"))?;
        let response: RunResponse = self.get_json(ctx, url, "registry.run").await?;
        let experiment_id = response.run.info.experiment_id;
        cache.insert(run_id.to_owned(), experiment_id.clone());
        Ok(experiment_id)
    }
}

impl ModelRegistry for MlflowRegistry {
    fn list_model_versions<'a>(
        &'a self,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Vec<RegisteredModelVersion>>> {
        Box::pin(async move {
            let url = self.endpoint("api/2.0/mlflow/model-versions/search")?;
            let response: SearchResponse =
                self.get_json(ctx, url, "registry.search").await?;

            let mut experiments = BTreeMap::new();
            let mut versions = Vec::with_capacity(response.model_versions.len());
            for version in response.model_versions {
                // Versions without a run cannot be mirrored (the run id is the key).
                let Some(run_id) = version.run_id else {
                    continue;
                };
                let experiment_id = self
                    .experiment_for_run(ctx, &run_id, &mut experiments)
                    .await?;
                versions.push(RegisteredModelVersion {
                    run_id: run_id.into_boxed_str(),
                    experiment_id: experiment_id.into_boxed_str(),
                    model_name: version.name.into_boxed_str(),
                    model_version: version.version.into_boxed_str(),
                    created_at_ms: version.creation_timestamp.unwrap_or(0),
                });
            }
            Ok(versions)
        })
    }
}
