//! Query endpoint.

use axum::{extract::State, routing::post, Json, Router};
use lakeward_proto::QueryResult;

use super::CallerPrincipal;
use crate::error::AppError;
use crate::json::{QueryRequest, SuccessResponse};
use crate::AppState;

/// Query routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/query", post(handle_query))
}

/// Execute a read-only SQL query as the calling principal.
async fn handle_query(
    State(state): State<AppState>,
    CallerPrincipal(principal): CallerPrincipal,
    Json(request): Json<QueryRequest>,
) -> Result<Json<SuccessResponse<QueryResult>>, AppError> {
    let engine = state.engine.clone();
    let result =
        tokio::task::spawn_blocking(move || engine.execute(&principal, &request.sql)).await??;
    Ok(Json(SuccessResponse::new(result)))
}
