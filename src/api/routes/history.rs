//! History handlers.

use super::HistoryQuery;
use crate::api::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// GET /history - Finished tasks, newest first
#[utoipa::path(
    get,
    path = "/api/v1/history",
    tag = "history",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum number of items to return"),
        ("offset" = Option<i64>, Query, description = "Number of items to skip")
    ),
    responses(
        (status = 200, description = "Task history", body = Vec<crate::types::HistoryEntry>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50).clamp(1, 1000) as usize;
    let offset = query.offset.unwrap_or(0).max(0) as usize;

    let entries = match state.forwarder.history(limit, offset).await {
        Ok(entries) => entries,
        Err(e) => return e.into_response(),
    };
    match state.forwarder.history_count().await {
        Ok(total) => (
            StatusCode::OK,
            Json(json!({
                "items": entries,
                "total": total,
                "limit": limit,
                "offset": offset
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /history - Clear history
#[utoipa::path(
    delete,
    path = "/api/v1/history",
    tag = "history",
    responses(
        (status = 200, description = "Number of deleted entries"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn clear_history(State(state): State<AppState>) -> Response {
    match state.forwarder.clear_history().await {
        Ok(deleted) => (StatusCode::OK, Json(json!({"deleted": deleted}))).into_response(),
        Err(e) => e.into_response(),
    }
}
