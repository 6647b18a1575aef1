//! Evaluation task store contract.

use crate::BoxFuture;
use benchkube_domain::{DeploymentId, EvaluationTask, TaskId, TaskState};
use benchkube_shared::{RequestContext, Result};

/// Conditional state write for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    /// New state.
    pub state: TaskState,
    /// New due instant (retry re-arm), when changed.
    pub scheduled_at_ms: Option<u64>,
    /// New attempt counter, when changed.
    pub attempts: Option<u32>,
    /// New error detail, when any.
    pub last_error: Option<Box<str>>,
    /// Deployment created by a successful firing.
    pub deployment_id: Option<DeploymentId>,
    /// Write timestamp (epoch ms).
    pub updated_at_ms: u64,
}

/// Store for scheduled evaluation tasks.
///
/// The conditional state transition (`transition`, `claim_due`) is the
/// at-most-once anchor: it survives process restarts because it lives in the
/// database, not in an in-memory lock.
pub trait EvaluationTaskStore: Send + Sync {
    /// Insert a new task.
    fn insert<'a>(
        &'a self,
        ctx: &'a RequestContext,
        task: EvaluationTask,
    ) -> BoxFuture<'a, Result<()>>;

    /// Fetch a task; `not_found` when absent.
    fn get<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a TaskId,
    ) -> BoxFuture<'a, Result<EvaluationTask>>;

    /// List tasks, optionally restricted to one state.
    fn list<'a>(
        &'a self,
        ctx: &'a RequestContext,
        state: Option<TaskState>,
    ) -> BoxFuture<'a, Result<Vec<EvaluationTask>>>;

    /// Atomically claim due tasks: conditional write `scheduled -> firing`
    /// for every task with `scheduled_at <= now`, up to `limit`.
    ///
    /// Each returned task was claimed by exactly this caller.
    fn claim_due<'a>(
        &'a self,
        ctx: &'a RequestContext,
        now_ms: u64,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<EvaluationTask>>>;

    /// Conditional transition from `expected` state; false when the
    /// condition did not hold (someone else won).
    fn transition<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a TaskId,
        expected: TaskState,
        update: TaskUpdate,
    ) -> BoxFuture<'a, Result<bool>>;
}
