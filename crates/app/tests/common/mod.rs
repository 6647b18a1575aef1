//! Shared builders for app integration tests.
#![allow(dead_code)]

use benchkube_app::{DeploymentDeps, EvaluationDeps, PlacementDeps, SyncDeps};
use benchkube_domain::{FileType, Namespace, Project, ProjectId, VllmConfig};
use benchkube_ports::{ManifestStore, UpsertFile};
use benchkube_shared::{Clock as _, RequestContext};
use benchkube_testkit::{
    InMemoryDeploymentStore, InMemoryManifestStore, InMemorySourceClient, InMemoryTaskStore,
    InMemoryVllmStore, ManualClock, ScriptedClusterGateway,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const JOB_YAML: &str = concat!(
    "apiVersion: batch/v1\n",
    "kind: Job\n",
    "metadata:\n",
    "  name: latency-bench\n",
    "spec:\n",
    "  template:\n",
    "    spec:\n",
    "      containers:\n",
    "        - name: bench\n",
    "          image: bench:1\n",
    "      restartPolicy: Never\n",
);

pub struct World {
    pub ctx: RequestContext,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<ScriptedClusterGateway>,
    pub manifest_store: Arc<InMemoryManifestStore>,
    pub deployment_store: Arc<InMemoryDeploymentStore>,
    pub vllm_store: Arc<InMemoryVllmStore>,
    pub task_store: Arc<InMemoryTaskStore>,
    pub source: Arc<InMemorySourceClient>,
}

impl World {
    pub fn new() -> Self {
        Self {
            ctx: RequestContext::new_request(),
            clock: Arc::new(ManualClock::at(1_000)),
            gateway: Arc::new(ScriptedClusterGateway::new()),
            manifest_store: Arc::new(InMemoryManifestStore::new()),
            deployment_store: Arc::new(InMemoryDeploymentStore::new()),
            vllm_store: Arc::new(InMemoryVllmStore::new()),
            task_store: Arc::new(InMemoryTaskStore::new()),
            source: Arc::new(InMemorySourceClient::new()),
        }
    }

    pub fn deploy_deps(&self) -> DeploymentDeps {
        DeploymentDeps {
            store: self.deployment_store.clone(),
            vllm_store: self.vllm_store.clone(),
            gateway: self.gateway.clone(),
            clock: self.clock.clone(),
            job_max_failures: 3,
            vllm_max_failures: 2,
            reconcile_parallelism: 16,
        }
    }

    pub fn placement_deps(&self) -> PlacementDeps {
        PlacementDeps {
            vllm_store: self.vllm_store.clone(),
            admission: Arc::new(tokio::sync::Mutex::new(())),
            eviction_timeout: Duration::from_secs(5),
        }
    }

    pub fn evaluation_deps(&self, delay_ms: u64) -> EvaluationDeps {
        EvaluationDeps {
            manifest_store: self.manifest_store.clone(),
            task_store: self.task_store.clone(),
            deploy: self.deploy_deps(),
            clock: self.clock.clone(),
            evaluation_delay_ms: delay_ms,
            max_attempts: 3,
            default_namespace: Namespace::default_namespace(),
        }
    }

    pub fn sync_deps(&self) -> SyncDeps {
        SyncDeps {
            store: self.manifest_store.clone(),
            source: self.source.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn project(&self) -> Project {
        Project {
            id: ProjectId::parse("p1").expect("valid id"),
            name: "latency-suite".into(),
            owner: "bench-org".into(),
            repository: "bench-manifests".into(),
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

    /// Seed a job file into the manifest store, returning its id.
    pub async fn seed_job_file(&self) -> benchkube_domain::FileId {
        let outcome = self
            .manifest_store
            .upsert_file(
                &self.ctx,
                UpsertFile {
                    project_id: ProjectId::parse("p1").expect("valid id"),
                    path: "jobs/latency.yaml".into(),
                    name: "latency.yaml".into(),
                    content: JOB_YAML.as_bytes().to_vec(),
                    file_type: FileType::Job,
                    benchmark_type: "latency".into(),
                    source_commit: "c1".into(),
                    observed_at_ms: self.clock.now_ms(),
                },
            )
            .await
            .expect("seed job file");
        outcome.file_id
    }

    /// Seed a config file into the manifest store, returning its id.
    pub async fn seed_config_file(&self, content: &[u8]) -> benchkube_domain::FileId {
        let outcome = self
            .manifest_store
            .upsert_file(
                &self.ctx,
                UpsertFile {
                    project_id: ProjectId::parse("p1").expect("valid id"),
                    path: "configs/latency.json".into(),
                    name: "latency.json".into(),
                    content: content.to_vec(),
                    file_type: FileType::Config,
                    benchmark_type: "latency".into(),
                    source_commit: "c1".into(),
                    observed_at_ms: self.clock.now_ms(),
                },
            )
            .await
            .expect("seed config file");
        outcome.file_id
    }
}

pub fn vllm_config(model: &str, gpu_type: &str, count: u32) -> VllmConfig {
    VllmConfig {
        model_name: model.into(),
        gpu_resource_type: gpu_type.into(),
        gpu_resource_count: count,
        gpu_memory_utilization: None,
        max_num_seqs: None,
        block_size: None,
        tensor_parallel_size: None,
        pipeline_parallel_size: None,
        trust_remote_code: None,
        dtype: None,
        max_model_len: None,
        quantization: None,
        served_model_name: None,
        port: Some(8000),
        additional_args: BTreeMap::new(),
    }
}
