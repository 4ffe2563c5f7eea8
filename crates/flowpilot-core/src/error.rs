//! Stable error taxonomy shared across FlowPilot services.
//!
//! Each service defines its own domain error enum (e.g. `DelegationError`),
//! but every variant maps onto one of these kinds so that HTTP status codes
//! and reason-code families stay consistent platform-wide.

use serde::Serialize;

/// The stable error-kind taxonomy from the authorization design (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Unauthenticated,
    PermissionDenied,
    StorageError,
    UpstreamError,
    RateOrSizeExceeded,
}

impl ErrorKind {
    /// The HTTP status code a handler should return for this kind.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RateOrSizeExceeded => 413,
            ErrorKind::StorageError => 500,
            ErrorKind::UpstreamError => 502,
        }
    }
}

/// A platform-wide error carrying a kind, a stable reason code, and
/// operator-facing detail that is sanitized before crossing the wire unless
/// `INCLUDE_ERROR_DETAILS` is set.
#[derive(Debug, thiserror::Error)]
#[error("{reason_code}: {detail}")]
pub struct FlowPilotError {
    pub kind: ErrorKind,
    pub reason_code: &'static str,
    pub detail: String,
}

impl FlowPilotError {
    #[must_use]
    pub fn new(kind: ErrorKind, reason_code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            kind,
            reason_code,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn invalid_argument(reason_code: &'static str, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, reason_code, detail)
    }

    #[must_use]
    pub fn not_found(reason_code: &'static str, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, reason_code, detail)
    }

    #[must_use]
    pub fn storage(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageError, "authz.system_error", detail)
    }

    #[must_use]
    pub fn upstream(reason_code: &'static str, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamError, reason_code, detail)
    }

    /// Body emitted to callers. Full `detail` is included only when
    /// `INCLUDE_ERROR_DETAILS` is truthy; otherwise a family label is sent.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let include_details = std::env::var("INCLUDE_ERROR_DETAILS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        ErrorBody {
            detail: if include_details {
                self.detail.clone()
            } else {
                family_label(self.kind).to_string()
            },
            reason_codes: vec![self.reason_code.to_string()],
        }
    }
}

fn family_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidArgument => "invalid request",
        ErrorKind::NotFound => "not found",
        ErrorKind::Unauthenticated => "unauthenticated",
        ErrorKind::PermissionDenied => "permission denied",
        ErrorKind::StorageError => "internal storage error",
        ErrorKind::UpstreamError => "upstream collaborator error",
        ErrorKind::RateOrSizeExceeded => "request too large",
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub reason_codes: Vec<String>,
}
