use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowpilot_core::error::FlowPilotError;

#[derive(Debug)]
pub struct ApiError(pub FlowPilotError);

impl From<FlowPilotError> for ApiError {
    fn from(err: FlowPilotError) -> Self {
        Self(err)
    }
}

impl From<flowpilot_policy::ManifestError> for ApiError {
    fn from(err: flowpilot_policy::ManifestError) -> Self {
        let kind = match &err {
            flowpilot_policy::ManifestError::NotFound(..)
            | flowpilot_policy::ManifestError::MissingPolicyHint => {
                flowpilot_core::error::ErrorKind::InvalidArgument
            }
            _ => flowpilot_core::error::ErrorKind::StorageError,
        };
        Self(FlowPilotError::new(kind, "authz.invalid_policy", err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body())).into_response()
    }
}
