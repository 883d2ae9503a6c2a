//! Security error types.

use lakeward_proto::ErrorKind;
use thiserror::Error;

/// Errors returned by the secure query engine's operations.
///
/// Messages are shown to the requesting principal. They never name the
/// privilege that was missing and never contain policy text.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// A referenced securable does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The principal lacks a required privilege.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Malformed SQL or an unsupported statement shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// The embedded engine failed or a policy could not be applied.
    #[error("execution error: {0}")]
    Execution(String),

    /// Governance store failure.
    #[error("storage error: {0}")]
    Storage(#[from] crate::error::Error),
}

impl SecurityError {
    /// Classification used by callers to pick a status code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SecurityError::NotFound(_) => ErrorKind::NotFound,
            SecurityError::AccessDenied(_) => ErrorKind::AccessDenied,
            SecurityError::Validation(_) => ErrorKind::Validation,
            SecurityError::Execution(_) | SecurityError::Storage(_) => ErrorKind::Execution,
        }
    }
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;
