//! Mongo-backed evaluation task store.

use crate::mongo::{is_duplicate_key, map_mongo_error, ms};
use benchkube_domain::{EvaluationTask, TaskId, TaskState};
use benchkube_ports::{BoxFuture, EvaluationTaskStore, TaskUpdate};
use benchkube_shared::{ErrorEnvelope, RequestContext, Result};
use bson::{Bson, doc};
use futures_util::TryStreamExt;
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

/// Store over the `evaluation_tasks` collection.
///
/// `claim_due` and `transition` are conditional writes; they are the
/// at-most-once firing anchor and survive process restarts.
#[derive(Debug, Clone)]
pub struct MongoTaskStore {
    tasks: Collection<EvaluationTask>,
}

impl MongoTaskStore {
    /// Build over a database handle.
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            tasks: database.collection("evaluation_tasks"),
        }
    }
}

impl EvaluationTaskStore for MongoTaskStore {
    fn insert<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        task: EvaluationTask,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.tasks.insert_one(&task).await.map_err(|error| {
                if is_duplicate_key(&error) {
                    ErrorEnvelope::conflict("task id already exists")
                } else {
                    map_mongo_error(&error)
                }
            })?;
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
                .find_one(doc! { "task_id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .ok_or_else(|| ErrorEnvelope::not_found("no such task"))
        })
    }

    fn list<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        state: Option<TaskState>,
    ) -> BoxFuture<'a, Result<Vec<EvaluationTask>>> {
        Box::pin(async move {
            let filter = state.map_or_else(
                || doc! {},
                |state| doc! { "state": state.as_str() },
            );
            self.tasks
                .find(filter)
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))
        })
    }

    fn claim_due<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        now_ms: u64,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<EvaluationTask>>> {
        Box::pin(async move {
            // One conditional pop at a time: each find_one_and_update is an
            // atomic scheduled -> firing claim, so concurrent sweepers (or a
            // restarted process) can never double-fire a task.
            let mut claimed = Vec::new();
            while claimed.len() < limit as usize {
                let task = self
                    .tasks
                    .find_one_and_update(
                        doc! {
                            "state": TaskState::Scheduled.as_str(),
                            "scheduled_at_ms": { "$lte": ms(now_ms) },
                        },
                        doc! { "$set": {
                            "state": TaskState::Firing.as_str(),
                            "updated_at_ms": ms(now_ms),
                        } },
                    )
                    .return_document(ReturnDocument::After)
                    .await
                    .map_err(|error| map_mongo_error(&error))?;
                match task {
                    Some(task) => claimed.push(task),
                    None => break,
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
            let mut set = doc! {
                "state": update.state.as_str(),
                "updated_at_ms": ms(update.updated_at_ms),
            };
            if let Some(scheduled_at_ms) = update.scheduled_at_ms {
                set.insert("scheduled_at_ms", ms(scheduled_at_ms));
            }
            if let Some(attempts) = update.attempts {
                set.insert("attempts", attempts);
            }
            if let Some(last_error) = &update.last_error {
                set.insert("last_error", Bson::String(last_error.to_string()));
            }
            if let Some(deployment_id) = &update.deployment_id {
                set.insert("deployment_id", deployment_id.as_str());
            }

            let result = self
                .tasks
                .update_one(
                    doc! {
                        "task_id": id.as_str(),
                        "state": expected.as_str(),
                    },
                    doc! { "$set": set },
                )
                .await
                .map_err(|error| map_mongo_error(&error))?;
            Ok(result.matched_count == 1)
        })
    }
}
