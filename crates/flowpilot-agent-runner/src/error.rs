use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowpilot_core::error::FlowPilotError;

/// Wraps `FlowPilotError` for this service's handlers. A denied or
/// partially-denied run is still a `200` carrying a `RunRecord` — this only
/// covers request-shape failures and genuine upstream transport faults
/// (domain service or authorization engine unreachable).
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
