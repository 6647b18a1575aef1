//! MongoDB store implementations.
//!
//! One database, six collections (`projects`, `files`, `modified_files`,
//! `deployments`, `vllm_deployments`, `evaluation_tasks`). Conditional
//! `find_one_and_update` / filtered `update_one` writes are the at-most-once
//! anchors; they live in the database so the schedulers survive restarts.

mod deployment_store;
mod evaluation_store;
mod manifest_store;

pub use deployment_store::{MongoDeploymentStore, MongoVllmStore};
pub use evaluation_store::MongoTaskStore;
pub use manifest_store::MongoManifestStore;

use benchkube_domain::{Deployment, EvaluationTask, ModifiedFile, Project, SourceFile, VllmDeployment};
use benchkube_shared::{ErrorEnvelope, Result};
use bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};

/// Duplicate-key error code raised by unique index violations.
const DUPLICATE_KEY: i32 = 11_000;

/// Map a driver error onto the shared taxonomy.
pub(crate) fn map_mongo_error(error: &mongodb::error::Error) -> ErrorEnvelope {
    if is_duplicate_key(error) {
        return ErrorEnvelope::conflict("a document with these keys already exists");
    }
    ErrorEnvelope::upstream(format!("database error: {error}")).with_metadata("store", "mongodb")
}

pub(crate) fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match &*error.kind {
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(write)) => {
            write.code == DUPLICATE_KEY
        },
        mongodb::error::ErrorKind::Command(command) => command.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Epoch-ms as a BSON-filter value.
pub(crate) fn ms(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// The full set of Mongo-backed stores sharing one client.
#[derive(Debug, Clone)]
pub struct MongoStores {
    /// Manifest store.
    pub manifest: MongoManifestStore,
    /// Benchmark deployment store.
    pub deployments: MongoDeploymentStore,
    /// Inference-server deployment store.
    pub vllm: MongoVllmStore,
    /// Evaluation task store.
    pub tasks: MongoTaskStore,
    database: Database,
}

impl MongoStores {
    /// Connect and build the stores. The database name comes from the URL
    /// path, defaulting to `benchkube`.
    pub async fn connect(mongo_url: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongo_url)
            .await
            .map_err(|error| map_mongo_error(&error))?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database("benchkube"));
        Ok(Self::from_database(database))
    }

    /// Build stores over an existing database handle.
    #[must_use]
    pub fn from_database(database: Database) -> Self {
        Self {
            manifest: MongoManifestStore::new(&database),
            deployments: MongoDeploymentStore::new(&database),
            vllm: MongoVllmStore::new(&database),
            tasks: MongoTaskStore::new(&database),
            database,
        }
    }

    /// Liveness check: `ping` against the database.
    pub async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|error| map_mongo_error(&error))
    }

    /// The underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.database
    }
}

/// Create the required indexes. Idempotent; called at startup.
pub async fn ensure_indexes(database: &Database) -> Result<()> {
    let unique = |keys| {
        IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build()
    };
    let plain = |keys| IndexModel::builder().keys(keys).build();

    database
        .collection::<SourceFile>("files")
        .create_index(unique(doc! { "project_id": 1, "path": 1 }))
        .await
        .map_err(|error| map_mongo_error(&error))?;
    database
        .collection::<ModifiedFile>("modified_files")
        .create_index(unique(doc! { "original_file_id": 1, "modified_name": 1 }))
        .await
        .map_err(|error| map_mongo_error(&error))?;
    database
        .collection::<Project>("projects")
        .create_index(unique(doc! { "id": 1 }))
        .await
        .map_err(|error| map_mongo_error(&error))?;
    database
        .collection::<Deployment>("deployments")
        .create_index(plain(doc! { "status": 1, "updated_at_ms": 1 }))
        .await
        .map_err(|error| map_mongo_error(&error))?;
    database
        .collection::<VllmDeployment>("vllm_deployments")
        .create_index(plain(doc! { "deployment.status": 1, "deployment.updated_at_ms": 1 }))
        .await
        .map_err(|error| map_mongo_error(&error))?;
    let tasks = database.collection::<EvaluationTask>("evaluation_tasks");
    tasks
        .create_index(plain(doc! { "state": 1, "scheduled_at_ms": 1 }))
        .await
        .map_err(|error| map_mongo_error(&error))?;
    tasks
        .create_index(unique(doc! { "task_id": 1 }))
        .await
        .map_err(|error| map_mongo_error(&error))?;
    Ok(())
}
