use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowpilot_core::error::FlowPilotError;

/// Thin wrapper so `FlowPilotError` (defined in `flowpilot-core`, which
/// carries no axum dependency) can be returned from this service's handlers.
#[derive(Debug)]
pub struct ApiError(pub FlowPilotError);

impl From<FlowPilotError> for ApiError {
    fn from(err: FlowPilotError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body())).into_response()
    }
}
