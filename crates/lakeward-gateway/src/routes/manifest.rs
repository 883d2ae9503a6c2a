//! Manifest endpoint.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use lakeward_proto::Manifest;

use super::CallerPrincipal;
use crate::error::AppError;
use crate::json::SuccessResponse;
use crate::AppState;

/// Manifest routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/manifest/:catalog/:schema/:table", get(handle_manifest))
}

async fn handle_manifest(
    State(state): State<AppState>,
    CallerPrincipal(principal): CallerPrincipal,
    Path((catalog, schema, table)): Path<(String, String, String)>,
) -> Result<Json<SuccessResponse<Manifest>>, AppError> {
    let engine = state.engine.clone();
    let manifest = tokio::task::spawn_blocking(move || {
        engine.get_manifest(&principal, &catalog, &schema, &table)
    })
    .await??;
    Ok(Json(SuccessResponse::new(manifest)))
}
