//! API v1 DTO types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error payload returned by every endpoint on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBodyDto {
    /// Stable machine-readable code (e.g. `ERR_CORE_CONFLICT`).
    pub code: String,
    /// Stable human-readable detail string.
    pub detail: String,
    /// Optional metadata for debugging and correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, String>>,
}

/// Request body for `POST /projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectCreateRequest {
    /// Human-readable project name.
    pub name: String,
    /// Owner (organisation or user) of the source repository.
    pub owner: String,
    /// Source repository name.
    pub repository: String,
    /// Branch or ref to poll (defaults to `main`).
    #[serde(default)]
    pub reference: Option<String>,
    /// Folder holding evaluation config files.
    pub config_folder: String,
    /// Folder holding benchmark job manifests.
    pub job_folder: String,
    /// Poll interval in seconds (>= 10).
    pub poll_interval_seconds: u64,
    /// Reference to the credential used for source access.
    #[serde(default)]
    pub credentials_ref: Option<String>,
}

/// Request body for `PUT /projects/{id}`.
pub type ProjectUpdateRequest = ProjectCreateRequest;

/// Project representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDto {
    /// Project identifier.
    pub id: String,
    /// Human-readable project name.
    pub name: String,
    /// Owner of the source repository.
    pub owner: String,
    /// Source repository name.
    pub repository: String,
    /// Branch or ref polled.
    pub reference: String,
    /// Folder holding evaluation config files.
    pub config_folder: String,
    /// Folder holding benchmark job manifests.
    pub job_folder: String,
    /// Poll interval in seconds.
    pub poll_interval_seconds: u64,
    /// Creation timestamp (epoch ms).
    pub created_at_ms: u64,
    /// Last update timestamp (epoch ms).
    pub updated_at_ms: u64,
    /// Outcome of the most recent poll tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll: Option<PollOutcomeDto>,
}

/// Poll tick outcome representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcomeDto {
    /// When the tick finished (epoch ms).
    pub finished_at_ms: u64,
    /// Files listed during the tick.
    pub files_seen: u32,
    /// Files whose content or commit changed.
    pub files_changed: u32,
    /// Consecutive failures so far.
    pub consecutive_failures: u32,
    /// Error from the tick, when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Source file representation (content omitted from listings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDto {
    /// File identifier.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Path within the source repository.
    pub path: String,
    /// File name.
    pub name: String,
    /// `config` or `job`.
    pub file_type: String,
    /// Benchmark suite label.
    pub benchmark_type: String,
    /// Commit SHA the content was fetched at.
    pub source_commit: String,
    /// Last observation instant (epoch ms).
    pub last_observed_at_ms: u64,
    /// Soft-delete marker.
    pub orphaned: bool,
    /// True when the file vanished from the source since the last poll.
    pub stale: bool,
    /// Content (UTF-8), present on single-file reads only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Request body for `POST /projects/{id}/modified-files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModifiedFileCreateRequest {
    /// The original file to override.
    pub original_file_id: String,
    /// Override name, unique per original.
    pub modified_name: String,
    /// Override content (UTF-8).
    pub content: String,
}

/// Request body for override updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModifiedFileUpdateRequest {
    /// New override content (UTF-8).
    pub content: String,
}

/// Override representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFileDto {
    /// Override identifier.
    pub id: String,
    /// The original file this override shadows.
    pub original_file_id: String,
    /// Override name.
    pub modified_name: String,
    /// Override content (UTF-8).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Creation timestamp (epoch ms).
    pub created_at_ms: u64,
    /// Last update timestamp (epoch ms).
    pub updated_at_ms: u64,
    /// True when the original file was deleted.
    pub orphaned: bool,
}

/// Request body for `POST /deploy` and `POST /delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeployRequest {
    /// YAML manifest (one or more documents).
    pub yaml_content: String,
    /// Target namespace (defaults to the configured namespace).
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Tracked deployment representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDto {
    /// Deployment identifier (ULID).
    pub deployment_id: String,
    /// Namespace the bundle was applied to.
    pub namespace: String,
    /// Kind of the primary resource.
    pub primary_resource_type: String,
    /// Name of the primary resource.
    pub primary_resource_name: String,
    /// Current status.
    pub status: String,
    /// Creation timestamp (epoch ms).
    pub created_at_ms: u64,
    /// Last status write (epoch ms).
    pub updated_at_ms: u64,
    /// Reconciliations that observed a pod failure.
    pub failure_count: u32,
    /// Most recent error detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Strict inference-server config as accepted on the wire.
///
/// Unknown keys are rejected here, at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VllmConfigDto {
    /// Model to serve.
    pub model_name: String,
    /// GPU resource type requested.
    pub gpu_resource_type: String,
    /// GPU resource count requested.
    pub gpu_resource_count: u32,
    /// Fraction of GPU memory the server may use.
    #[serde(default)]
    pub gpu_memory_utilization: Option<serde_json::Value>,
    /// Maximum concurrent sequences.
    #[serde(default)]
    pub max_num_seqs: Option<u32>,
    /// KV-cache block size.
    #[serde(default)]
    pub block_size: Option<u32>,
    /// Tensor parallel degree.
    #[serde(default)]
    pub tensor_parallel_size: Option<u32>,
    /// Pipeline parallel degree.
    #[serde(default)]
    pub pipeline_parallel_size: Option<u32>,
    /// Allow remote code execution.
    #[serde(default)]
    pub trust_remote_code: Option<bool>,
    /// Model dtype.
    #[serde(default)]
    pub dtype: Option<String>,
    /// Maximum model context length.
    #[serde(default)]
    pub max_model_len: Option<u32>,
    /// Quantization scheme.
    #[serde(default)]
    pub quantization: Option<String>,
    /// Name the model is served under.
    #[serde(default)]
    pub served_model_name: Option<String>,
    /// Serving port (defaults to 8000).
    #[serde(default)]
    pub port: Option<u16>,
    /// Extra CLI arguments; scalar values only.
    #[serde(default)]
    pub additional_args: BTreeMap<String, serde_json::Value>,
}

/// Request body for the vLLM `POST /deploy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VllmDeployRequest {
    /// Inference-server config.
    pub config: VllmConfigDto,
    /// Target namespace (defaults to the configured namespace).
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Response body for the vLLM `POST /deploy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VllmDeployResponse {
    /// The live deployment serving this config (new or reused).
    pub deployment_id: String,
    /// True when an identical deployment was reused.
    pub reused: bool,
    /// Deployments evicted to admit this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evicted: Vec<String>,
}

/// Tracked vLLM deployment representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VllmDeploymentDto {
    /// The underlying tracked deployment.
    #[serde(flatten)]
    pub deployment: DeploymentDto,
    /// Model served.
    pub model_name: String,
    /// GPU resource type requested.
    pub gpu_resource_type: String,
    /// GPU resource count requested.
    pub gpu_resource_count: u32,
}

/// Request body for `POST /evaluate` and `POST /run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvaluateRequest {
    /// Project the job and config files belong to.
    pub project_id: String,
    /// Benchmark suite label (defaults to the job file's).
    #[serde(default)]
    pub benchmark_type: Option<String>,
    /// Job manifest to run.
    pub job_file_id: String,
    /// Optional evaluation config to mount.
    #[serde(default)]
    pub config_file_id: Option<String>,
    /// Optional override to use instead of the original job file.
    #[serde(default)]
    pub job_override_id: Option<String>,
    /// Model endpoint injected as `VLLM_MODEL_ENDPOINT`.
    #[serde(default)]
    pub vllm_model_endpoint: Option<String>,
    /// Human-readable run name.
    #[serde(default)]
    pub name: Option<String>,
    /// Target namespace (defaults to the configured namespace).
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Response body for `POST /evaluate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    /// Scheduled task identifier.
    pub task_id: String,
    /// Instant the task becomes due (epoch ms).
    pub scheduled_at_ms: u64,
}

/// Evaluation task representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
    /// Task identifier.
    pub task_id: String,
    /// Project the files belong to.
    pub project_id: String,
    /// Benchmark suite label.
    pub benchmark_type: String,
    /// Job manifest to run.
    pub job_file_id: String,
    /// Optional evaluation config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file_id: Option<String>,
    /// Model endpoint injected into the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_endpoint: Option<String>,
    /// Run name.
    pub name: String,
    /// Instant the task becomes due (epoch ms).
    pub scheduled_at_ms: u64,
    /// Current state.
    pub state: String,
    /// Submission attempts so far.
    pub attempts: u32,
    /// Most recent submission error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Deployment created by a successful firing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

/// Response body for `POST /run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    /// Deployment created by the synchronous run.
    pub deployment_id: String,
}

/// Request body for `POST /jobs/{name}/terminal`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TerminalCreateRequest {
    /// Container to attach to (defaults to the first container).
    #[serde(default)]
    pub container: Option<String>,
    /// Shell to run (defaults to `/bin/bash`, falling back to `/bin/sh`).
    #[serde(default)]
    pub shell: Option<String>,
}

/// Response body for terminal session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalCreateResponse {
    /// Session identifier.
    pub session_id: String,
    /// WebSocket URL the client connects to.
    pub websocket_url: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    /// `ok` when the database is reachable.
    pub status: String,
}
