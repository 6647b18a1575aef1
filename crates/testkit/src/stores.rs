//! In-memory store implementations for port contracts.

use benchkube_domain::{
    Deployment, DeploymentId, EvaluationTask, FileId, ModifiedFile, ModifiedFileId, PollOutcome,
    Project, ProjectId, SourceFile, TaskId, TaskState, VllmDeployment,
};
use benchkube_ports::{
    BoxFuture, DeploymentFilter, DeploymentStore, EvaluationTaskStore, FileFilter, ManifestStore,
    StatusUpdate, TaskUpdate, UpsertFile, VllmDeploymentStore,
};
use benchkube_shared::{ErrorEnvelope, RequestContext, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory manifest store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryManifestStore {
    state: Arc<RwLock<ManifestState>>,
    override_seq: Arc<AtomicU64>,
}

#[derive(Debug, Default)]
struct ManifestState {
    projects: BTreeMap<Box<str>, Project>,
    files: BTreeMap<Box<str>, SourceFile>,
    overrides: BTreeMap<Box<str>, ModifiedFile>,
}

impl InMemoryManifestStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an override id (tests may also pick their own).
    #[must_use]
    pub fn next_override_id(&self) -> Box<str> {
        let n = self.override_seq.fetch_add(1, Ordering::Relaxed);
        format!("mf-{n}").into_boxed_str()
    }

    /// Total number of file records (for poll idempotence assertions).
    pub async fn file_count(&self) -> usize {
        self.state.read().await.files.len()
    }
}

impl ManifestStore for InMemoryManifestStore {
    fn create_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        project: Project,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let key: Box<str> = project.id.as_str().into();
            if state.projects.contains_key(&key) {
                return Err(ErrorEnvelope::conflict("project id already exists"));
            }
            state.projects.insert(key, project);
            Ok(())
        })
    }

    fn get_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<Project>> {
        Box::pin(async move {
            self.state
                .read()
                .await
                .projects
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| ErrorEnvelope::not_found("no such project"))
        })
    }

    fn list_projects<'a>(&'a self, _ctx: &'a RequestContext) -> BoxFuture<'a, Result<Vec<Project>>> {
        Box::pin(async move { Ok(self.state.read().await.projects.values().cloned().collect()) })
    }

    fn update_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        project: Project,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let key: Box<str> = project.id.as_str().into();
            if !state.projects.contains_key(&key) {
                return Err(ErrorEnvelope::not_found("no such project"));
            }
            state.projects.insert(key, project);
            Ok(())
        })
    }

    fn delete_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.projects.remove(id.as_str()).is_none() {
                return Err(ErrorEnvelope::not_found("no such project"));
            }
            let owned: Vec<Box<str>> = state
                .files
                .iter()
                .filter(|(_, file)| file.project_id == *id)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &owned {
                if let Some(file) = state.files.remove(key) {
                    let dangling: Vec<Box<str>> = state
                        .overrides
                        .iter()
                        .filter(|(_, modified)| modified.original_file_id == file.id)
                        .map(|(key, _)| key.clone())
                        .collect();
                    for override_key in dangling {
                        state.overrides.remove(&override_key);
                    }
                }
            }
            Ok(())
        })
    }

    fn record_poll_outcome<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ProjectId,
        outcome: PollOutcome,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let project = state
                .projects
                .get_mut(id.as_str())
                .ok_or_else(|| ErrorEnvelope::not_found("no such project"))?;
            project.last_poll = Some(outcome);
            Ok(())
        })
    }

    fn upsert_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        input: UpsertFile,
    ) -> BoxFuture<'a, Result<benchkube_ports::UpsertOutcome>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let existing = state
                .files
                .values_mut()
                .find(|file| file.project_id == input.project_id && file.path == input.path);

            if let Some(file) = existing {
                let changed =
                    file.content != input.content || file.source_commit != input.source_commit;
                file.content = input.content;
                file.source_commit = input.source_commit;
                file.last_observed_at_ms = input.observed_at_ms;
                file.orphaned = false;
                return Ok(benchkube_ports::UpsertOutcome {
                    file_id: file.id.clone(),
                    created: false,
                    changed,
                });
            }

            let id = FileId::derive(&input.path, &input.source_commit);
            let file = SourceFile {
                id: id.clone(),
                project_id: input.project_id,
                path: input.path,
                name: input.name,
                content: input.content,
                file_type: input.file_type,
                benchmark_type: input.benchmark_type,
                source_commit: input.source_commit,
                last_observed_at_ms: input.observed_at_ms,
                orphaned: false,
            };
            state.files.insert(id.as_str().into(), file);
            Ok(benchkube_ports::UpsertOutcome {
                file_id: id,
                created: true,
                changed: true,
            })
        })
    }

    fn list_files<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        project_id: &'a ProjectId,
        filter: FileFilter,
    ) -> BoxFuture<'a, Result<Vec<SourceFile>>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .files
                .values()
                .filter(|file| file.project_id == *project_id)
                .filter(|file| filter.include_orphaned || !file.orphaned)
                .filter(|file| {
                    filter
                        .file_type
                        .is_none_or(|file_type| file.file_type == file_type)
                })
                .filter(|file| {
                    filter
                        .benchmark_type
                        .as_ref()
                        .is_none_or(|benchmark| file.benchmark_type == *benchmark)
                })
                .cloned()
                .collect())
        })
    }

    fn get_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a FileId,
    ) -> BoxFuture<'a, Result<SourceFile>> {
        Box::pin(async move {
            self.state
                .read()
                .await
                .files
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| ErrorEnvelope::not_found("no such file"))
        })
    }

    fn delete_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a FileId,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let file = state
                .files
                .get_mut(id.as_str())
                .ok_or_else(|| ErrorEnvelope::not_found("no such file"))?;
            file.orphaned = true;
            for modified in state.overrides.values_mut() {
                if modified.original_file_id == *id {
                    modified.orphaned = true;
                }
            }
            Ok(())
        })
    }

    fn create_modified_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        modified: ModifiedFile,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let duplicate = state.overrides.values().any(|existing| {
                existing.original_file_id == modified.original_file_id
                    && existing.modified_name == modified.modified_name
            });
            if duplicate {
                return Err(ErrorEnvelope::conflict(
                    "an override with this name already exists",
                ));
            }
            state
                .overrides
                .insert(modified.id.as_str().into(), modified);
            Ok(())
        })
    }

    fn get_modified_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ModifiedFileId,
    ) -> BoxFuture<'a, Result<ModifiedFile>> {
        Box::pin(async move {
            self.state
                .read()
                .await
                .overrides
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| ErrorEnvelope::not_found("no such override"))
        })
    }

    fn list_modified_files_for_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        project_id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<Vec<ModifiedFile>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let owned: Vec<FileId> = state
                .files
                .values()
                .filter(|file| file.project_id == *project_id)
                .map(|file| file.id.clone())
                .collect();
            Ok(state
                .overrides
                .values()
                .filter(|modified| owned.contains(&modified.original_file_id))
                .cloned()
                .collect())
        })
    }

    fn list_modified_files_for_original<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        original: &'a FileId,
    ) -> BoxFuture<'a, Result<Vec<ModifiedFile>>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .overrides
                .values()
                .filter(|modified| modified.original_file_id == *original)
                .cloned()
                .collect())
        })
    }

    fn update_modified_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ModifiedFileId,
        content: Vec<u8>,
        updated_at_ms: u64,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let modified = state
                .overrides
                .get_mut(id.as_str())
                .ok_or_else(|| ErrorEnvelope::not_found("no such override"))?;
            modified.content = content;
            modified.updated_at_ms = updated_at_ms;
            Ok(())
        })
    }

    fn delete_modified_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ModifiedFileId,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state
                .overrides
                .remove(id.as_str())
                .map(|_| ())
                .ok_or_else(|| ErrorEnvelope::not_found("no such override"))
        })
    }

    fn reset_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        project_id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let owned: Vec<FileId> = state
                .files
                .values()
                .filter(|file| file.project_id == *project_id)
                .map(|file| file.id.clone())
                .collect();
            let doomed: Vec<Box<str>> = state
                .overrides
                .iter()
                .filter(|(_, modified)| owned.contains(&modified.original_file_id))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &doomed {
                state.overrides.remove(key);
            }
            Ok(u64::try_from(doomed.len()).unwrap_or(u64::MAX))
        })
    }
}

/// In-memory deployment store with conditional writes.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeploymentStore {
    records: Arc<RwLock<BTreeMap<Box<str>, Deployment>>>,
}

impl InMemoryDeploymentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn filter_matches(filter: &DeploymentFilter, deployment: &Deployment) -> bool {
    filter.statuses.is_empty() || filter.statuses.contains(&deployment.status)
}

impl DeploymentStore for InMemoryDeploymentStore {
    fn insert<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        deployment: Deployment,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            let key: Box<str> = deployment.deployment_id.as_str().into();
            if records.contains_key(&key) {
                return Err(ErrorEnvelope::conflict("deployment id already exists"));
            }
            records.insert(key, deployment);
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a DeploymentId,
    ) -> BoxFuture<'a, Result<Deployment>> {
        Box::pin(async move {
            self.records
                .read()
                .await
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| ErrorEnvelope::not_found("no such deployment"))
        })
    }

    fn list<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        filter: DeploymentFilter,
    ) -> BoxFuture<'a, Result<Vec<Deployment>>> {
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .await
                .values()
                .filter(|deployment| filter_matches(&filter, deployment))
                .cloned()
                .collect())
        })
    }

    fn update_status<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a DeploymentId,
        expected_updated_at_ms: u64,
        update: StatusUpdate,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            let record = records
                .get_mut(id.as_str())
                .ok_or_else(|| ErrorEnvelope::not_found("no such deployment"))?;
            if record.updated_at_ms != expected_updated_at_ms {
                return Ok(false);
            }
            record.status = update.status;
            record.failure_count = update.failure_count;
            record.last_error = update.last_error;
            record.updated_at_ms = update.updated_at_ms;
            Ok(true)
        })
    }
}

/// In-memory vLLM deployment store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVllmStore {
    records: Arc<RwLock<BTreeMap<Box<str>, VllmDeployment>>>,
}

impl InMemoryVllmStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VllmDeploymentStore for InMemoryVllmStore {
    fn insert<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        deployment: VllmDeployment,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            let key: Box<str> = deployment.deployment.deployment_id.as_str().into();
            if records.contains_key(&key) {
                return Err(ErrorEnvelope::conflict("deployment id already exists"));
            }
            records.insert(key, deployment);
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a DeploymentId,
    ) -> BoxFuture<'a, Result<VllmDeployment>> {
        Box::pin(async move {
            self.records
                .read()
                .await
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| ErrorEnvelope::not_found("no such deployment"))
        })
    }

    fn list<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        filter: DeploymentFilter,
    ) -> BoxFuture<'a, Result<Vec<VllmDeployment>>> {
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .await
                .values()
                .filter(|vllm| filter_matches(&filter, &vllm.deployment))
                .cloned()
                .collect())
        })
    }

    fn update_status<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a DeploymentId,
        expected_updated_at_ms: u64,
        update: StatusUpdate,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            let record = records
                .get_mut(id.as_str())
                .ok_or_else(|| ErrorEnvelope::not_found("no such deployment"))?;
            if record.deployment.updated_at_ms != expected_updated_at_ms {
                return Ok(false);
            }
            record.deployment.status = update.status;
            record.deployment.failure_count = update.failure_count;
            record.deployment.last_error = update.last_error;
            record.deployment.updated_at_ms = update.updated_at_ms;
            Ok(true)
        })
    }
}

/// In-memory evaluation task store with conditional transitions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<BTreeMap<Box<str>, EvaluationTask>>>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvaluationTaskStore for InMemoryTaskStore {
    fn insert<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        task: EvaluationTask,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut tasks = self.tasks.write().await;
            let key: Box<str> = task.task_id.as_str().into();
            if tasks.contains_key(&key) {
                return Err(ErrorEnvelope::conflict("task id already exists"));
            }
            tasks.insert(key, task);
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a TaskId,
    ) -> BoxFuture<'a, Result<EvaluationTask>> {
        Box::pin(async move {
            self.tasks
                .read()
                .await
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| ErrorEnvelope::not_found("no such task"))
        })
    }

    fn list<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        state: Option<TaskState>,
    ) -> BoxFuture<'a, Result<Vec<EvaluationTask>>> {
        Box::pin(async move {
            Ok(self
                .tasks
                .read()
                .await
                .values()
                .filter(|task| state.is_none_or(|state| task.state == state))
                .cloned()
                .collect())
        })
    }

    fn claim_due<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        now_ms: u64,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<EvaluationTask>>> {
        Box::pin(async move {
            let mut tasks = self.tasks.write().await;
            let mut claimed = Vec::new();
            for task in tasks.values_mut() {
                if claimed.len() >= limit as usize {
                    break;
                }
                if task.is_due_at(now_ms) {
                    task.state = TaskState::Firing;
                    task.updated_at_ms = now_ms;
                    claimed.push(task.clone());
                }
            }
            Ok(claimed)
        })
    }

    fn transition<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a TaskId,
        expected: TaskState,
        update: TaskUpdate,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut tasks = self.tasks.write().await;
            let task = tasks
                .get_mut(id.as_str())
                .ok_or_else(|| ErrorEnvelope::not_found("no such task"))?;
            if task.state != expected || !task.state.can_transition_to(update.state) {
                return Ok(false);
            }
            task.state = update.state;
            if let Some(scheduled_at_ms) = update.scheduled_at_ms {
                task.scheduled_at_ms = scheduled_at_ms;
            }
            if let Some(attempts) = update.attempts {
                task.attempts = attempts;
            }
            if update.last_error.is_some() {
                task.last_error = update.last_error;
            }
            if update.deployment_id.is_some() {
                task.deployment_id = update.deployment_id;
            }
            task.updated_at_ms = update.updated_at_ms;
            Ok(true)
        })
    }
}
