//! HTTP route handlers.

pub mod health;
pub mod manifest;
pub mod profile;
pub mod query;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Header carrying the authenticated principal name.
pub const PRINCIPAL_HEADER: &str = "x-principal";

/// The principal a request acts as.
#[derive(Debug, Clone)]
pub struct CallerPrincipal(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CallerPrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let name = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", PRINCIPAL_HEADER)))?;
        Ok(CallerPrincipal(name.to_string()))
    }
}
