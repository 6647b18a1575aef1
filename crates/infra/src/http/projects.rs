//! Project, file, and override handlers.

use crate::http::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use benchkube_api::v1::{
    FileDto, ModifiedFileCreateRequest, ModifiedFileDto, ModifiedFileUpdateRequest, ProjectCreateRequest,
    ProjectDto, ProjectUpdateRequest, file_to_dto, modified_file_to_dto, project_from_create_request,
    project_to_dto, project_with_update,
};
use benchkube_domain::{FileId, FileType, ModifiedFile, ModifiedFileId, ProjectId};
use benchkube_ports::FileFilter;
use benchkube_shared::{Clock as _, ErrorEnvelope, RequestContext, new_override_id};
use serde::Deserialize;
use std::sync::Arc;

fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    slug.trim_matches('-').to_string()
}

pub(crate) async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProjectCreateRequest>,
) -> Result<(StatusCode, Json<ProjectDto>), ApiError> {
    let ctx = RequestContext::new_request();
    let slug = slugify(&request.name);
    let id = ProjectId::parse(&slug)
        .map_err(|_| ErrorEnvelope::invalid("project name yields an empty identifier"))?;
    let project = project_from_create_request(&request, id, state.clock.now_ms())?;
    state.manifest_store.create_project(&ctx, project.clone()).await?;
    Ok((StatusCode::CREATED, Json(project_to_dto(&project))))
}

pub(crate) async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectDto>>, ApiError> {
    let ctx = RequestContext::new_request();
    let projects = state.manifest_store.list_projects(&ctx).await?;
    Ok(Json(projects.iter().map(project_to_dto).collect()))
}

pub(crate) async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProjectDto>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = ProjectId::parse(&id)?;
    let project = state.manifest_store.get_project(&ctx, &id).await?;
    Ok(Json(project_to_dto(&project)))
}

pub(crate) async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ProjectUpdateRequest>,
) -> Result<Json<ProjectDto>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = ProjectId::parse(&id)?;
    let existing = state.manifest_store.get_project(&ctx, &id).await?;
    let updated = project_with_update(&existing, &request, state.clock.now_ms())?;
    state.manifest_store.update_project(&ctx, updated.clone()).await?;
    Ok(Json(project_to_dto(&updated)))
}

pub(crate) async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ctx = RequestContext::new_request();
    let id = ProjectId::parse(&id)?;
    state.manifest_store.delete_project(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn force_sync(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ctx = RequestContext::new_request();
    let id = ProjectId::parse(&id)?;
    // 404 for unknown projects, then queue the tick.
    state.manifest_store.get_project(&ctx, &id).await?;
    state.sync_scheduler.force(&id).await;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileQuery {
    file_type: Option<String>,
    benchmark_type: Option<String>,
}

pub(crate) async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Json<Vec<FileDto>>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = ProjectId::parse(&id)?;
    let project = state.manifest_store.get_project(&ctx, &id).await?;

    let file_type = match query.file_type.as_deref() {
        None => None,
        Some("config") => Some(FileType::Config),
        Some("job") => Some(FileType::Job),
        Some(other) => {
            return Err(
                ErrorEnvelope::invalid(format!("unknown fileType `{other}`")).into(),
            );
        },
    };
    let filter = FileFilter {
        file_type,
        benchmark_type: query.benchmark_type.as_deref().map(Into::into),
        include_orphaned: false,
    };
    let files = state.manifest_store.list_files(&ctx, &id, filter).await?;
    let last_poll_ms = project
        .last_poll
        .as_ref()
        .filter(|outcome| outcome.error.is_none())
        .map_or(0, |outcome| outcome.finished_at_ms);
    Ok(Json(
        files
            .iter()
            .map(|file| file_to_dto(file, last_poll_ms, false))
            .collect(),
    ))
}

pub(crate) async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileDto>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = FileId::parse(&id)?;
    let file = state.manifest_store.get_file(&ctx, &id).await?;
    Ok(Json(file_to_dto(&file, 0, true)))
}

pub(crate) async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ctx = RequestContext::new_request();
    let id = FileId::parse(&id)?;
    state.manifest_store.delete_file(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn create_modified_file(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(request): Json<ModifiedFileCreateRequest>,
) -> Result<(StatusCode, Json<ModifiedFileDto>), ApiError> {
    let ctx = RequestContext::new_request();
    let project_id = ProjectId::parse(&project_id)?;
    // The original must exist and belong to this project.
    let original_id = FileId::parse(&request.original_file_id)?;
    let original = state.manifest_store.get_file(&ctx, &original_id).await?;
    if original.project_id != project_id {
        return Err(ErrorEnvelope::not_found("no such file in this project").into());
    }

    let now = state.clock.now_ms();
    let modified = ModifiedFile {
        id: ModifiedFileId::parse(new_override_id())?,
        original_file_id: original_id,
        modified_name: request.modified_name.trim().into(),
        content: request.content.into_bytes(),
        created_at_ms: now,
        updated_at_ms: now,
        orphaned: false,
    };
    state
        .manifest_store
        .create_modified_file(&ctx, modified.clone())
        .await?;
    Ok((StatusCode::CREATED, Json(modified_file_to_dto(&modified, false))))
}

pub(crate) async fn list_modified_files(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<ModifiedFileDto>>, ApiError> {
    let ctx = RequestContext::new_request();
    let project_id = ProjectId::parse(&project_id)?;
    let overrides = state
        .manifest_store
        .list_modified_files_for_project(&ctx, &project_id)
        .await?;
    Ok(Json(
        overrides
            .iter()
            .map(|modified| modified_file_to_dto(modified, false))
            .collect(),
    ))
}

pub(crate) async fn get_modified_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ModifiedFileDto>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = ModifiedFileId::parse(&id)?;
    let modified = state.manifest_store.get_modified_file(&ctx, &id).await?;
    Ok(Json(modified_file_to_dto(&modified, true)))
}

pub(crate) async fn update_modified_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ModifiedFileUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let ctx = RequestContext::new_request();
    let id = ModifiedFileId::parse(&id)?;
    state
        .manifest_store
        .update_modified_file(&ctx, &id, request.content.into_bytes(), state.clock.now_ms())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn delete_modified_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ctx = RequestContext::new_request();
    let id = ModifiedFileId::parse(&id)?;
    state.manifest_store.delete_modified_file(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn reset_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = ProjectId::parse(&id)?;
    let deleted = state.manifest_store.reset_project(&ctx, &id).await?;
    Ok(Json(serde_json::json!({ "deletedOverrides": deleted })))
}
