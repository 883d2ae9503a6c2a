//! Table profiling endpoint.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use lakeward_proto::TableStatistics;

use super::CallerPrincipal;
use crate::error::AppError;
use crate::json::SuccessResponse;
use crate::AppState;

/// Profiling routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/tables/:schema/:table/profile", post(handle_profile))
}

/// Profile a table in the default catalog. Counts ignore row filters.
async fn handle_profile(
    State(state): State<AppState>,
    CallerPrincipal(principal): CallerPrincipal,
    Path((schema, table)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<TableStatistics>>, AppError> {
    let engine = state.engine.clone();
    let stats =
        tokio::task::spawn_blocking(move || engine.profile_table(&principal, &schema, &table))
            .await??;
    Ok(Json(SuccessResponse::new(stats)))
}
