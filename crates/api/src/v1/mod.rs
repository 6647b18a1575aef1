//! API v1 DTOs and helpers.

mod mappers;
mod terminal;
mod types;
mod validation;

pub use mappers::{
    deployment_to_dto, error_body, file_to_dto, http_status_for, modified_file_to_dto,
    project_to_dto, task_to_dto, vllm_deployment_to_dto,
};
pub use terminal::{ClientFrame, ServerFrame};
pub use types::*;
pub use validation::{
    project_from_create_request, project_with_update, vllm_config_from_dto,
};
