use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowpilot_core::error::FlowPilotError;

/// Thin wrapper so `FlowPilotError` can be returned from this service's
/// handlers. The `/v1/evaluate` handler itself never returns this — a
/// policy verdict is always a `200` with `{decision, reason_codes, advice}`,
/// even `deny`. This only covers request-shape failures axum surfaces
/// before the pipeline runs (e.g. an unparsable body).
#[derive(Debug)]
pub struct ApiError(pub FlowPilotError);

impl From<FlowPilotError> for ApiError {
    fn from(err: FlowPilotError) -> Self {
        Self(err)
    }
}

impl From<flowpilot_policy::ManifestError> for ApiError {
    fn from(err: flowpilot_policy::ManifestError) -> Self {
        use flowpilot_policy::ManifestError;
        let wrapped = match err {
            ManifestError::NotFound(..) | ManifestError::MissingPolicyHint => {
                FlowPilotError::invalid_argument("authz.invalid_policy", err.to_string())
            }
            other => FlowPilotError::storage(other.to_string()),
        };
        Self(wrapped)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body())).into_response()
    }
}
