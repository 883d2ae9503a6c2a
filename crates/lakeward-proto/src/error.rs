//! Error classification.

use serde::{Deserialize, Serialize};

/// Kind of failure returned by an engine operation.
///
/// Callers map these to transport status codes without looking at messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The securable does not exist.
    NotFound,
    /// A required privilege is missing.
    AccessDenied,
    /// Malformed SQL or an unsupported statement shape.
    Validation,
    /// The embedded engine failed, or a policy could not be applied.
    Execution,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::AccessDenied => 403,
            ErrorKind::Validation => 400,
            ErrorKind::Execution => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Execution => "EXECUTION_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
