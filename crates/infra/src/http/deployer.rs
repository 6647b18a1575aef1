//! Generic deploy surface: apply/delete by YAML, status, logs, terminals.

use crate::http::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use benchkube_api::v1::{
    DeployRequest, DeploymentDto, TerminalCreateRequest, TerminalCreateResponse, deployment_to_dto,
};
use benchkube_app::{deployment_logs, submit_deployment};
use benchkube_domain::{Deployment, DeploymentId, DeploymentStatus, Namespace};
use benchkube_ports::{DeploymentFilter, LogOptions};
use benchkube_shared::{ErrorEnvelope, RequestContext, Result};
use futures_util::TryStreamExt;
use serde::Deserialize;
use std::sync::Arc;

fn namespace_or_default(state: &AppState, namespace: Option<&str>) -> Result<Namespace> {
    match namespace {
        Some(raw) => Namespace::parse(raw),
        None => Ok(state.settings.default_namespace.clone()),
    }
}

pub(crate) async fn deploy(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeployRequest>,
) -> Result<(StatusCode, Json<DeploymentDto>), ApiError> {
    let ctx = RequestContext::new_request();
    let namespace = namespace_or_default(&state, request.namespace.as_deref())?;
    let deployment =
        submit_deployment(&ctx, &state.deploy_deps(), &request.yaml_content, namespace).await?;
    Ok((StatusCode::CREATED, Json(deployment_to_dto(&deployment))))
}

pub(crate) async fn delete_by_yaml(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeployRequest>,
) -> Result<StatusCode, ApiError> {
    let ctx = RequestContext::new_request();
    let namespace = namespace_or_default(&state, request.namespace.as_deref())?;
    // Symmetric to /deploy: delete the named resources, then mark any
    // tracked deployments carrying this manifest.
    state
        .gateway
        .delete(&ctx, &request.yaml_content, &namespace)
        .await?;
    let tracked = state
        .deployment_store
        .list(&ctx, DeploymentFilter::non_terminal())
        .await?;
    let deps = state.deploy_deps();
    for record in tracked {
        if record.yaml_content.as_ref() == request.yaml_content {
            benchkube_app::delete_deployment(&ctx, &deps, &record.deployment_id).await?;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_deployments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeploymentDto>>, ApiError> {
    let ctx = RequestContext::new_request();
    let deployments = state
        .deployment_store
        .list(&ctx, DeploymentFilter::non_terminal())
        .await?;
    Ok(Json(deployments.iter().map(deployment_to_dto).collect()))
}

pub(crate) async fn get_deployment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentDto>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = DeploymentId::parse(&id)?;
    let deployment = state.deployment_store.get(&ctx, &id).await?;
    Ok(Json(deployment_to_dto(&deployment)))
}

/// Latest tracked deployment whose primary resource carries this name.
pub(crate) async fn find_by_primary_name(
    ctx: &RequestContext,
    state: &AppState,
    name: &str,
) -> Result<Deployment> {
    let mut matches: Vec<Deployment> = state
        .deployment_store
        .list(ctx, DeploymentFilter::default())
        .await?
        .into_iter()
        .filter(|deployment| deployment.primary_resource_name.as_ref() == name)
        .collect();
    matches.sort_by_key(|deployment| deployment.created_at_ms);
    // Prefer the newest live record over deleted history.
    matches
        .iter()
        .rev()
        .find(|deployment| deployment.status != DeploymentStatus::Deleted)
        .or_else(|| matches.last())
        .cloned()
        .ok_or_else(|| ErrorEnvelope::not_found(format!("no deployment tracks job `{name}`")))
}

pub(crate) async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeploymentDto>, ApiError> {
    let ctx = RequestContext::new_request();
    let deployment = find_by_primary_name(&ctx, &state, &name).await?;
    Ok(Json(deployment_to_dto(&deployment)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsQuery {
    tail: Option<u32>,
    #[serde(default)]
    follow: bool,
    since: Option<u32>,
}

pub(crate) async fn job_logs(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, ApiError> {
    let ctx = RequestContext::new_request();
    let deployment = find_by_primary_name(&ctx, &state, &name).await?;
    let options = LogOptions {
        container: None,
        since_seconds: query.since,
        tail_lines: Some(query.tail.unwrap_or(state.settings.log_tail_lines)),
        follow: query.follow,
    };
    let stream = deployment_logs(&ctx, &state.deploy_deps(), &deployment.deployment_id, options)
        .await?
        .map_err(std::io::Error::other);
    let response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from_stream(stream))
        .map_err(|error| ErrorEnvelope::fatal(format!("response build failed: {error}")))?;
    Ok(response)
}

pub(crate) async fn create_terminal(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<TerminalCreateRequest>,
) -> Result<(StatusCode, Json<TerminalCreateResponse>), ApiError> {
    let ctx = RequestContext::new_request();
    let deployment = find_by_primary_name(&ctx, &state, &name).await?;
    let session = state
        .broker
        .create_session(
            &ctx,
            &deployment.deployment_id,
            request.container.map(Into::into),
            request.shell.map(Into::into),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(TerminalCreateResponse {
            session_id: session.session_id.as_str().to_owned(),
            websocket_url: format!("/terminal/{}", session.session_id),
        }),
    ))
}
