//! Error handling for the gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lakeward_core::SecurityError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request carried no principal.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// An engine operation failed.
    #[error(transparent)]
    Security(#[from] SecurityError),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Security(err) => StatusCode::from_u16(err.kind().http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Security(err) => err.kind().code(),
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: true,
            code: self.code().to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("engine task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_error_kind() {
        let cases = [
            (SecurityError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (SecurityError::AccessDenied("no".into()), StatusCode::FORBIDDEN),
            (SecurityError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                SecurityError::Execution("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
        assert_eq!(
            AppError::Unauthorized("missing".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_code_follows_error_kind() {
        let err = AppError::from(SecurityError::AccessDenied("no".into()));
        assert_eq!(err.code(), "ACCESS_DENIED");
        assert_eq!(err.to_string(), "access denied: no");
    }
}
