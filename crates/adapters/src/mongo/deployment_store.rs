//! Mongo-backed deployment stores.

use crate::mongo::{is_duplicate_key, map_mongo_error, ms};
use benchkube_domain::{Deployment, DeploymentId, VllmDeployment};
use benchkube_ports::{
    BoxFuture, DeploymentFilter, DeploymentStore, StatusUpdate, VllmDeploymentStore,
};
use benchkube_shared::{ErrorEnvelope, RequestContext, Result};
use bson::{Bson, doc};
use futures_util::TryStreamExt;
use mongodb::{Collection, Database};

fn status_filter(filter: &DeploymentFilter, status_field: &str) -> bson::Document {
    if filter.statuses.is_empty() {
        doc! {}
    } else {
        let statuses: Vec<&str> = filter
            .statuses
            .iter()
            .map(|status| status.as_str())
            .collect();
        doc! { status_field: { "$in": statuses } }
    }
}

fn status_update(update: &StatusUpdate, prefix: &str) -> bson::Document {
    let error = update
        .last_error
        .as_ref()
        .map_or(Bson::Null, |error| Bson::String(error.to_string()));
    let mut set = bson::Document::new();
    set.insert(format!("{prefix}status"), update.status.as_str());
    set.insert(format!("{prefix}failure_count"), update.failure_count);
    set.insert(format!("{prefix}last_error"), error);
    set.insert(format!("{prefix}updated_at_ms"), ms(update.updated_at_ms));
    doc! { "$set": set }
}

/// Store over the `deployments` collection.
#[derive(Debug, Clone)]
pub struct MongoDeploymentStore {
    deployments: Collection<Deployment>,
}

impl MongoDeploymentStore {
    /// Build over a database handle.
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            deployments: database.collection("deployments"),
        }
    }
}

impl DeploymentStore for MongoDeploymentStore {
    fn insert<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        deployment: Deployment,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.deployments
                .insert_one(&deployment)
                .await
                .map_err(|error| {
                    if is_duplicate_key(&error) {
                        ErrorEnvelope::conflict("deployment id already exists")
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
        id: &'a DeploymentId,
    ) -> BoxFuture<'a, Result<Deployment>> {
        Box::pin(async move {
            self.deployments
                .find_one(doc! { "deployment_id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .ok_or_else(|| ErrorEnvelope::not_found("no such deployment"))
        })
    }

    fn list<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        filter: DeploymentFilter,
    ) -> BoxFuture<'a, Result<Vec<Deployment>>> {
        Box::pin(async move {
            self.deployments
                .find(status_filter(&filter, "status"))
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))
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
            let result = self
                .deployments
                .update_one(
                    doc! {
                        "deployment_id": id.as_str(),
                        "updated_at_ms": ms(expected_updated_at_ms),
                    },
                    status_update(&update, ""),
                )
                .await
                .map_err(|error| map_mongo_error(&error))?;
            Ok(result.matched_count == 1)
        })
    }
}

/// Store over the `vllm_deployments` collection.
#[derive(Debug, Clone)]
pub struct MongoVllmStore {
    deployments: Collection<VllmDeployment>,
}

impl MongoVllmStore {
    /// Build over a database handle.
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            deployments: database.collection("vllm_deployments"),
        }
    }
}

impl VllmDeploymentStore for MongoVllmStore {
    fn insert<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        deployment: VllmDeployment,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.deployments
                .insert_one(&deployment)
                .await
                .map_err(|error| {
                    if is_duplicate_key(&error) {
                        ErrorEnvelope::conflict("deployment id already exists")
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
        id: &'a DeploymentId,
    ) -> BoxFuture<'a, Result<VllmDeployment>> {
        Box::pin(async move {
            self.deployments
                .find_one(doc! { "deployment.deployment_id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .ok_or_else(|| ErrorEnvelope::not_found("no such deployment"))
        })
    }

    fn list<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        filter: DeploymentFilter,
    ) -> BoxFuture<'a, Result<Vec<VllmDeployment>>> {
        Box::pin(async move {
            self.deployments
                .find(status_filter(&filter, "deployment.status"))
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))
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
            let result = self
                .deployments
                .update_one(
                    doc! {
                        "deployment.deployment_id": id.as_str(),
                        "deployment.updated_at_ms": ms(expected_updated_at_ms),
                    },
                    status_update(&update, "deployment."),
                )
                .await
                .map_err(|error| map_mongo_error(&error))?;
            Ok(result.matched_count == 1)
        })
    }
}
