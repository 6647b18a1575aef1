//! Mongo-backed manifest store.

use crate::mongo::{is_duplicate_key, map_mongo_error, ms};
use benchkube_domain::{
    FileId, ModifiedFile, ModifiedFileId, PollOutcome, Project, ProjectId, SourceFile,
};
use benchkube_ports::{
    BoxFuture, FileFilter, ManifestStore, UpsertFile, UpsertOutcome,
};
use benchkube_shared::{ErrorEnvelope, RequestContext, Result};
use bson::doc;
use futures_util::TryStreamExt;
use mongodb::{Collection, Database};

/// Manifest store over `projects`, `files`, and `modified_files`.
#[derive(Debug, Clone)]
pub struct MongoManifestStore {
    projects: Collection<Project>,
    files: Collection<SourceFile>,
    modified: Collection<ModifiedFile>,
}

impl MongoManifestStore {
    /// Build over a database handle.
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            projects: database.collection("projects"),
            files: database.collection("files"),
            modified: database.collection("modified_files"),
        }
    }
}

impl ManifestStore for MongoManifestStore {
    fn create_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        project: Project,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.projects.insert_one(&project).await.map_err(|error| {
                if is_duplicate_key(&error) {
                    ErrorEnvelope::conflict("project id already exists")
                } else {
                    map_mongo_error(&error)
                }
            })?;
            Ok(())
        })
    }

    fn get_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<Project>> {
        Box::pin(async move {
            self.projects
                .find_one(doc! { "id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .ok_or_else(|| ErrorEnvelope::not_found("no such project"))
        })
    }

    fn list_projects<'a>(&'a self, _ctx: &'a RequestContext) -> BoxFuture<'a, Result<Vec<Project>>> {
        Box::pin(async move {
            self.projects
                .find(doc! {})
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))
        })
    }

    fn update_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        project: Project,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let result = self
                .projects
                .replace_one(doc! { "id": project.id.as_str() }, &project)
                .await
                .map_err(|error| map_mongo_error(&error))?;
            if result.matched_count == 0 {
                return Err(ErrorEnvelope::not_found("no such project"));
            }
            Ok(())
        })
    }

    fn delete_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let deleted = self
                .projects
                .delete_one(doc! { "id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?;
            if deleted.deleted_count == 0 {
                return Err(ErrorEnvelope::not_found("no such project"));
            }

            // Cascade: collect owned file ids, then drop files and overrides.
            let owned: Vec<SourceFile> = self
                .files
                .find(doc! { "project_id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))?;
            let file_ids: Vec<&str> = owned.iter().map(|file| file.id.as_str()).collect();
            self.modified
                .delete_many(doc! { "original_file_id": { "$in": file_ids } })
                .await
                .map_err(|error| map_mongo_error(&error))?;
            self.files
                .delete_many(doc! { "project_id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?;
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
            let outcome =
                bson::to_bson(&outcome).map_err(|error| {
                    ErrorEnvelope::invalid(format!("poll outcome serialization: {error}"))
                })?;
            self.projects
                .update_one(
                    doc! { "id": id.as_str() },
                    doc! { "$set": { "last_poll": outcome } },
                )
                .await
                .map_err(|error| map_mongo_error(&error))?;
            Ok(())
        })
    }

    fn upsert_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        input: UpsertFile,
    ) -> BoxFuture<'a, Result<UpsertOutcome>> {
        Box::pin(async move {
            let filter = doc! {
                "project_id": input.project_id.as_str(),
                "path": input.path.as_ref(),
            };
            let existing = self
                .files
                .find_one(filter.clone())
                .await
                .map_err(|error| map_mongo_error(&error))?;

            if let Some(file) = existing {
                let changed = file.content != input.content
                    || file.source_commit != input.source_commit;
                let content = bson::to_bson(&input.content).map_err(|error| {
                    ErrorEnvelope::invalid(format!("content serialization: {error}"))
                })?;
                self.files
                    .update_one(
                        filter,
                        doc! { "$set": {
                            "content": content,
                            "source_commit": input.source_commit.as_ref(),
                            "last_observed_at_ms": ms(input.observed_at_ms),
                            "orphaned": false,
                        } },
                    )
                    .await
                    .map_err(|error| map_mongo_error(&error))?;
                return Ok(UpsertOutcome {
                    file_id: file.id,
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
            self.files
                .insert_one(&file)
                .await
                .map_err(|error| map_mongo_error(&error))?;
            Ok(UpsertOutcome {
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
            let mut query = doc! { "project_id": project_id.as_str() };
            if let Some(file_type) = filter.file_type {
                query.insert("file_type", file_type.as_str());
            }
            if let Some(benchmark_type) = &filter.benchmark_type {
                query.insert("benchmark_type", benchmark_type.as_ref());
            }
            if !filter.include_orphaned {
                query.insert("orphaned", false);
            }
            self.files
                .find(query)
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))
        })
    }

    fn get_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a FileId,
    ) -> BoxFuture<'a, Result<SourceFile>> {
        Box::pin(async move {
            self.files
                .find_one(doc! { "id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .ok_or_else(|| ErrorEnvelope::not_found("no such file"))
        })
    }

    fn delete_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a FileId,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let updated = self
                .files
                .update_one(
                    doc! { "id": id.as_str() },
                    doc! { "$set": { "orphaned": true } },
                )
                .await
                .map_err(|error| map_mongo_error(&error))?;
            if updated.matched_count == 0 {
                return Err(ErrorEnvelope::not_found("no such file"));
            }
            self.modified
                .update_many(
                    doc! { "original_file_id": id.as_str() },
                    doc! { "$set": { "orphaned": true } },
                )
                .await
                .map_err(|error| map_mongo_error(&error))?;
            Ok(())
        })
    }

    fn create_modified_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        modified: ModifiedFile,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.modified.insert_one(&modified).await.map_err(|error| {
                if is_duplicate_key(&error) {
                    ErrorEnvelope::conflict("an override with this name already exists")
                } else {
                    map_mongo_error(&error)
                }
            })?;
            Ok(())
        })
    }

    fn get_modified_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ModifiedFileId,
    ) -> BoxFuture<'a, Result<ModifiedFile>> {
        Box::pin(async move {
            self.modified
                .find_one(doc! { "id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .ok_or_else(|| ErrorEnvelope::not_found("no such override"))
        })
    }

    fn list_modified_files_for_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        project_id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<Vec<ModifiedFile>>> {
        Box::pin(async move {
            let owned: Vec<SourceFile> = self
                .files
                .find(doc! { "project_id": project_id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))?;
            let file_ids: Vec<&str> = owned.iter().map(|file| file.id.as_str()).collect();
            self.modified
                .find(doc! { "original_file_id": { "$in": file_ids } })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))
        })
    }

    fn list_modified_files_for_original<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        original: &'a FileId,
    ) -> BoxFuture<'a, Result<Vec<ModifiedFile>>> {
        Box::pin(async move {
            self.modified
                .find(doc! { "original_file_id": original.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))
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
            let content = bson::to_bson(&content).map_err(|error| {
                ErrorEnvelope::invalid(format!("content serialization: {error}"))
            })?;
            let updated = self
                .modified
                .update_one(
                    doc! { "id": id.as_str() },
                    doc! { "$set": {
                        "content": content,
                        "updated_at_ms": ms(updated_at_ms),
                    } },
                )
                .await
                .map_err(|error| map_mongo_error(&error))?;
            if updated.matched_count == 0 {
                return Err(ErrorEnvelope::not_found("no such override"));
            }
            Ok(())
        })
    }

    fn delete_modified_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: &'a ModifiedFileId,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let deleted = self
                .modified
                .delete_one(doc! { "id": id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?;
            if deleted.deleted_count == 0 {
                return Err(ErrorEnvelope::not_found("no such override"));
            }
            Ok(())
        })
    }

    fn reset_project<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        project_id: &'a ProjectId,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let owned: Vec<SourceFile> = self
                .files
                .find(doc! { "project_id": project_id.as_str() })
                .await
                .map_err(|error| map_mongo_error(&error))?
                .try_collect()
                .await
                .map_err(|error| map_mongo_error(&error))?;
            let file_ids: Vec<&str> = owned.iter().map(|file| file.id.as_str()).collect();
            let deleted = self
                .modified
                .delete_many(doc! { "original_file_id": { "$in": file_ids } })
                .await
                .map_err(|error| map_mongo_error(&error))?;
            Ok(deleted.deleted_count)
        })
    }
}
