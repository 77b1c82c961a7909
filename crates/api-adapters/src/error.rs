//! Engine errors as HTTP responses.
//!
//! Every failure leaves the API as `{"error": <code>, "message": <text>}`
//! with a status picked from the error's kind.

use domains::{DomainError, ErrorKind};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
    pub message: &'a str,
}

/// Status for an engine error. Cooldown and geofence refusals are
/// reported as forbidden rather than as a state conflict.
pub fn status_for(err: &DomainError) -> u16 {
    match err {
        DomainError::CooldownActive { .. } | DomainError::OutsideGeofence { .. } => 403,
        other => match other.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Precondition => 409,
            ErrorKind::Infrastructure => 503,
        },
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: 400, code: "validation", message: message.into() }
    }

    pub fn body(&self) -> ErrorBody<'_> {
        ErrorBody { error: self.code, message: &self.message }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let status = status_for(&err);
        if status >= 500 {
            tracing::warn!(error = %err, "request failed on infrastructure");
        }
        Self { status, code: err.code(), message: err.to_string() }
    }
}

#[cfg(feature = "web-axum")]
mod axum_impl {
    use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;

    use super::ApiError;

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(self.body())).into_response()
        }
    }

    impl From<JsonRejection> for ApiError {
        fn from(rejection: JsonRejection) -> Self {
            ApiError::bad_request(rejection.body_text())
        }
    }

    impl From<PathRejection> for ApiError {
        fn from(rejection: PathRejection) -> Self {
            ApiError::bad_request(rejection.body_text())
        }
    }

    impl From<QueryRejection> for ApiError {
        fn from(rejection: QueryRejection) -> Self {
            ApiError::bad_request(rejection.body_text())
        }
    }
}
