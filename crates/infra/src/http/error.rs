//! Error-envelope to HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use benchkube_api::v1::{error_body, http_status_for};
use benchkube_shared::ErrorEnvelope;

/// Handler error: wraps the shared envelope for `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub ErrorEnvelope);

impl From<ErrorEnvelope> for ApiError {
    fn from(error: ErrorEnvelope) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(http_status_for(&self.0))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(error_body(&self.0))).into_response()
    }
}
