//! Boundary validation: wire DTOs into validated domain values.

use crate::v1::types::{ProjectCreateRequest, ProjectUpdateRequest, VllmConfigDto};
use benchkube_domain::{CanonicalValue, Project, ProjectId, VllmConfig};
use benchkube_shared::{ErrorEnvelope, Result};
use std::collections::BTreeMap;

/// Build a validated [`Project`] from a create request.
pub fn project_from_create_request(
    request: &ProjectCreateRequest,
    id: ProjectId,
    now_ms: u64,
) -> Result<Project> {
    let project = Project {
        id,
        name: request.name.trim().into(),
        owner: request.owner.trim().into(),
        repository: request.repository.trim().into(),
        reference: request
            .reference
            .as_deref()
            .map_or("main", str::trim)
            .into(),
        config_folder: normalize_folder(&request.config_folder)?,
        job_folder: normalize_folder(&request.job_folder)?,
        poll_interval_ms: request.poll_interval_seconds.saturating_mul(1000),
        credentials_ref: request.credentials_ref.as_deref().map(Into::into),
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
        last_poll: None,
    };
    project.validate()?;
    Ok(project)
}

/// Apply an update request onto an existing project.
pub fn project_with_update(
    existing: &Project,
    request: &ProjectUpdateRequest,
    now_ms: u64,
) -> Result<Project> {
    let mut updated = project_from_create_request(request, existing.id.clone(), now_ms)?;
    updated.created_at_ms = existing.created_at_ms;
    updated.last_poll = existing.last_poll.clone();
    Ok(updated)
}

fn normalize_folder(raw: &str) -> Result<Box<str>> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(ErrorEnvelope::invalid("folder paths must be non-empty"));
    }
    Ok(trimmed.into())
}

/// Convert the wire config into the strict domain record.
///
/// Scalar-only `additionalArgs`; nested values are rejected here rather than
/// deep inside the placement pipeline.
pub fn vllm_config_from_dto(dto: &VllmConfigDto) -> Result<VllmConfig> {
    let mut additional_args: BTreeMap<Box<str>, CanonicalValue> = BTreeMap::new();
    for (key, value) in &dto.additional_args {
        let canonical = CanonicalValue::from_json(value)
            .map_err(|error| error.with_metadata("argument", key.clone()))?;
        additional_args.insert(key.as_str().into(), canonical);
    }

    let gpu_memory_utilization = dto
        .gpu_memory_utilization
        .as_ref()
        .map(CanonicalValue::from_json)
        .transpose()
        .map_err(|error| error.with_metadata("field", "gpuMemoryUtilization"))?;

    let config = VllmConfig {
        model_name: dto.model_name.trim().into(),
        gpu_resource_type: dto.gpu_resource_type.trim().into(),
        gpu_resource_count: dto.gpu_resource_count,
        gpu_memory_utilization,
        max_num_seqs: dto.max_num_seqs,
        block_size: dto.block_size,
        tensor_parallel_size: dto.tensor_parallel_size,
        pipeline_parallel_size: dto.pipeline_parallel_size,
        trust_remote_code: dto.trust_remote_code,
        dtype: dto.dtype.as_deref().map(Into::into),
        max_model_len: dto.max_model_len,
        quantization: dto.quantization.as_deref().map(Into::into),
        served_model_name: dto.served_model_name.as_deref().map(Into::into),
        port: dto.port,
        additional_args,
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_request() -> ProjectCreateRequest {
        ProjectCreateRequest {
            name: "latency-suite".to_string(),
            owner: "bench-org".to_string(),
            repository: "bench-manifests".to_string(),
            reference: None,
            config_folder: "/configs/".to_string(),
            job_folder: "jobs".to_string(),
            poll_interval_seconds: 60,
            credentials_ref: None,
        }
    }

    #[test]
    fn project_request_normalizes_folders_and_defaults_ref() {
        let id = ProjectId::parse("p1").expect("valid id");
        let project = project_from_create_request(&create_request(), id, 5).expect("valid");
        assert_eq!(project.config_folder.as_ref(), "configs");
        assert_eq!(project.reference.as_ref(), "main");
        assert_eq!(project.poll_interval_ms, 60_000);
    }

    #[test]
    fn short_poll_interval_is_rejected() {
        let id = ProjectId::parse("p1").expect("valid id");
        let mut request = create_request();
        request.poll_interval_seconds = 5;
        assert!(project_from_create_request(&request, id, 0).is_err());
    }

    #[test]
    fn unknown_vllm_keys_are_rejected_by_serde() {
        let raw = json!({
            "modelName": "m",
            "gpuResourceType": "nvidia.com/gpu",
            "gpuResourceCount": 1,
            "surprise": true
        });
        let parsed: std::result::Result<VllmConfigDto, _> = serde_json::from_value(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn nested_additional_args_are_rejected() {
        let dto = VllmConfigDto {
            model_name: "m".to_string(),
            gpu_resource_type: "nvidia.com/gpu".to_string(),
            gpu_resource_count: 1,
            gpu_memory_utilization: None,
            max_num_seqs: None,
            block_size: None,
            tensor_parallel_size: None,
            pipeline_parallel_size: None,
            trust_remote_code: None,
            dtype: None,
            max_model_len: None,
            quantization: None,
            served_model_name: None,
            port: None,
            additional_args: [("extra".to_string(), json!({"nested": true}))]
                .into_iter()
                .collect(),
        };
        assert!(vllm_config_from_dto(&dto).is_err());
    }

    #[test]
    fn numeric_equivalent_encodings_fingerprint_identically() {
        let mut a = VllmConfigDto {
            model_name: "m".to_string(),
            gpu_resource_type: "nvidia.com/gpu".to_string(),
            gpu_resource_count: 1,
            gpu_memory_utilization: Some(json!(1)),
            max_num_seqs: None,
            block_size: None,
            tensor_parallel_size: None,
            pipeline_parallel_size: None,
            trust_remote_code: None,
            dtype: None,
            max_model_len: None,
            quantization: None,
            served_model_name: None,
            port: None,
            additional_args: BTreeMap::new(),
        };
        let int_config = vllm_config_from_dto(&a).expect("int config");
        a.gpu_memory_utilization = Some(json!(1.0));
        let float_config = vllm_config_from_dto(&a).expect("float config");
        assert_eq!(int_config.fingerprint(), float_config.fingerprint());
    }
}
