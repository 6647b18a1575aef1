//! Per-project source poll scheduling.
//!
//! One logical loop per project, multiplexed over a single manager tick:
//! each project keeps its own due time, failure count, and tick gate, so a
//! slow or failing project never blocks (or poisons) the others.

use benchkube_app::{SyncDeps, poll_project_once};
use benchkube_domain::{Project, ProjectId};
use benchkube_shared::{
    Clock, RequestContext, Result, RetryPolicy, TickGate, backoff_delay, jitter_seed,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct ProjectPollState {
    next_due_ms: u64,
    consecutive_failures: u32,
    gate: TickGate,
}

/// Schedules poll ticks per project.
pub struct SyncScheduler {
    deps: SyncDeps,
    clock: Arc<dyn Clock>,
    states: Mutex<BTreeMap<Box<str>, ProjectPollState>>,
}

impl SyncScheduler {
    /// Build a scheduler over the sync dependencies.
    #[must_use]
    pub fn new(deps: SyncDeps, clock: Arc<dyn Clock>) -> Self {
        Self {
            deps,
            clock,
            states: Mutex::new(BTreeMap::new()),
        }
    }

    /// Force a project's next tick to run immediately.
    ///
    /// Respects the single-inflight guarantee: if a tick is running, the
    /// forced one runs right after the current one finishes.
    pub async fn force(&self, project_id: &ProjectId) {
        let mut states = self.states.lock().await;
        states
            .entry(project_id.as_str().into())
            .or_default()
            .next_due_ms = 0;
    }

    /// One manager tick: run every due project poll, concurrently.
    pub async fn tick(&self, ctx: &RequestContext) -> Result<()> {
        let projects = self.deps.store.list_projects(ctx).await?;
        let now = self.clock.now_ms();

        let mut due = Vec::new();
        {
            let mut states = self.states.lock().await;
            // Drop state for deleted projects.
            states.retain(|id, _| projects.iter().any(|project| project.id.as_str() == id.as_ref()));
            for project in projects {
                let state = states.entry(project.id.as_str().into()).or_default();
                if state.next_due_ms > now {
                    continue;
                }
                let Some(permit) = state.gate.try_enter() else {
                    debug!(project = %project.id, "sync.tick skipped (previous still running)");
                    continue;
                };
                due.push((project, state.consecutive_failures, permit));
            }
        }

        let mut ticks = Vec::new();
        for (project, failures, permit) in due {
            let deps = self.deps.clone();
            let ctx = ctx.clone();
            ticks.push(async move {
                let outcome = poll_project_once(&ctx, &deps, &project, failures).await;
                drop(permit);
                (project, outcome)
            });
        }
        let outcomes = futures_util::future::join_all(ticks).await;

        let now = self.clock.now_ms();
        let mut states = self.states.lock().await;
        for (project, outcome) in outcomes {
            let state = states.entry(project.id.as_str().into()).or_default();
            state.consecutive_failures = outcome.consecutive_failures;
            state.next_due_ms = now.saturating_add(next_delay_ms(&project, outcome.consecutive_failures));
        }
        Ok(())
    }
}

/// Delay until the project's next tick: its own interval, or backoff after
/// failures (capped at 10x the interval, +/-25% jitter).
fn next_delay_ms(project: &Project, consecutive_failures: u32) -> u64 {
    if consecutive_failures == 0 {
        return project.poll_interval_ms;
    }
    let policy = RetryPolicy::for_loop_period(project.poll_interval_ms);
    u64::try_from(
        backoff_delay(
            policy,
            consecutive_failures,
            jitter_seed(project.id.as_str(), consecutive_failures),
        )
        .as_millis(),
    )
    .unwrap_or(u64::MAX)
}
