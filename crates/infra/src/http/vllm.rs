//! vLLM management surface: admission-gated deploys.

use crate::http::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use benchkube_api::v1::{
    VllmDeployRequest, VllmDeployResponse, VllmDeploymentDto, vllm_config_from_dto,
    vllm_deployment_to_dto,
};
use benchkube_app::deploy_vllm;
use benchkube_domain::{DeploymentId, Namespace};
use benchkube_ports::DeploymentFilter;
use benchkube_shared::RequestContext;
use std::sync::Arc;

pub(crate) async fn deploy(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VllmDeployRequest>,
) -> Result<(StatusCode, Json<VllmDeployResponse>), ApiError> {
    let ctx = RequestContext::new_request();
    let config = vllm_config_from_dto(&request.config)?;
    let namespace = match request.namespace.as_deref() {
        Some(raw) => Namespace::parse(raw)?,
        None => state.settings.default_namespace.clone(),
    };
    let outcome = deploy_vllm(
        &ctx,
        &state.placement_deps(),
        &state.deploy_deps(),
        config,
        namespace,
    )
    .await?;
    let status = if outcome.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(VllmDeployResponse {
            deployment_id: outcome.deployment_id.as_str().to_owned(),
            reused: outcome.reused,
            evicted: outcome
                .evicted
                .iter()
                .map(|id| id.as_str().to_owned())
                .collect(),
        }),
    ))
}

pub(crate) async fn list_deployments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VllmDeploymentDto>>, ApiError> {
    let ctx = RequestContext::new_request();
    let deployments = state
        .vllm_store
        .list(&ctx, DeploymentFilter::non_terminal())
        .await?;
    Ok(Json(deployments.iter().map(vllm_deployment_to_dto).collect()))
}

pub(crate) async fn get_deployment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VllmDeploymentDto>, ApiError> {
    let ctx = RequestContext::new_request();
    let id = DeploymentId::parse(&id)?;
    let deployment = state.vllm_store.get(&ctx, &id).await?;
    Ok(Json(vllm_deployment_to_dto(&deployment)))
}

pub(crate) async fn delete_deployment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ctx = RequestContext::new_request();
    let id = DeploymentId::parse(&id)?;
    benchkube_app::delete_vllm_deployment(&ctx, &state.deploy_deps(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
