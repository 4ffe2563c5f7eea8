use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowpilot_core::error::ErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("policy manifest directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("no valid policy manifests found in {0}")]
    NoManifestsFound(String),
    #[error("manifest '{0}' is invalid: {1}")]
    Invalid(String, String),
    #[error("policy '{0}' not found, available: {1}")]
    NotFound(String, String),
    #[error("policy_hint is required")]
    MissingPolicyHint,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl IntoResponse for ManifestError {
    fn into_response(self) -> Response {
        let (status, reason_code) = match &self {
            ManifestError::NotFound(..) | ManifestError::MissingPolicyHint => {
                (StatusCode::BAD_REQUEST, "authz.invalid_policy")
            }
            ManifestError::DirectoryNotFound(_)
            | ManifestError::NoManifestsFound(_)
            | ManifestError::Invalid(..)
            | ManifestError::Io(_)
            | ManifestError::Yaml(_) => (StatusCode::INTERNAL_SERVER_ERROR, "authz.system_error"),
        };
        let body = ErrorBody {
            detail: self.to_string(),
            reason_codes: vec![reason_code.to_string()],
        };
        (status, Json(body)).into_response()
    }
}
