//! Task handlers: start, list, inspect and cancel.

use super::{StartTaskBody, TaskIdResponse};
use crate::api::AppState;
use crate::error::{ApiError, Error};
use crate::types::{ChatRef, StartTaskRequest, UserId};
use crate::utils::parse_message_link;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /tasks - Start a forwarding task
#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    tag = "tasks",
    request_body = StartTaskBody,
    responses(
        (status = 201, description = "Task started", body = TaskIdResponse),
        (status = 400, description = "Invalid chat, link, range or filter settings", body = ApiError),
        (status = 409, description = "User already has a task or destination is claimed", body = ApiError),
        (status = 422, description = "Client unavailable or chats not accessible", body = ApiError),
        (status = 503, description = "Shutting down", body = ApiError)
    )
)]
pub async fn start_task(
    State(state): State<AppState>,
    Json(body): Json<StartTaskBody>,
) -> Response {
    let request = match build_request(body) {
        Ok(request) => request,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(ApiError::validation(message))).into_response();
        }
    };

    match state.forwarder.start_task(request).await {
        Ok(task_id) => (StatusCode::CREATED, Json(TaskIdResponse { task_id })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Resolve the body's chats and range into a start request
fn build_request(body: StartTaskBody) -> std::result::Result<StartTaskRequest, String> {
    let destination: ChatRef = body.destination.parse()?;

    let (source, linked_limit) = match (body.source_link.as_deref(), body.source.as_deref()) {
        (Some(link), _) => {
            let (chat, message_id) = parse_message_link(link)
                .ok_or_else(|| format!("invalid message link: {link:?}"))?;
            let limit = u64::try_from(message_id)
                .map_err(|_| format!("invalid message id in link: {link:?}"))?
                + 1;
            (chat, Some(limit))
        }
        (None, Some(source)) => (source.parse()?, None),
        (None, None) => return Err("either source or source_link is required".to_string()),
    };

    let limit = body
        .limit
        .or(linked_limit)
        .ok_or_else(|| "limit is required when no source_link is given".to_string())?;

    Ok(StartTaskRequest {
        user_id: UserId(body.user_id),
        source,
        destination,
        skip: body.skip,
        limit,
        nonce: body.nonce,
        config: body.config,
    })
}

/// GET /tasks - List running tasks
#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    tag = "tasks",
    responses(
        (status = 200, description = "Snapshots of running tasks", body = Vec<crate::types::ProgressSnapshot>)
    )
)]
pub async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.forwarder.active_tasks())
}

/// GET /users/:user_id/task - Progress of a user's running task
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/task",
    tag = "tasks",
    params(
        ("user_id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Progress with speed and ETA", body = crate::types::ProgressReport),
        (status = 404, description = "User has no running task", body = ApiError)
    )
)]
pub async fn get_user_task(State(state): State<AppState>, Path(user_id): Path<i64>) -> Response {
    match state.forwarder.progress(UserId(user_id)) {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => Error::NotFound(format!("running task for user {user_id}")).into_response(),
    }
}

/// DELETE /users/:user_id/task - Cancel a user's running task
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}/task",
    tag = "tasks",
    params(
        ("user_id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 202, description = "Cancellation requested", body = TaskIdResponse),
        (status = 404, description = "User has no running task", body = ApiError)
    )
)]
pub async fn cancel_user_task(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Response {
    match state.forwarder.cancel_task(UserId(user_id)) {
        Some(task_id) => (StatusCode::ACCEPTED, Json(TaskIdResponse { task_id })).into_response(),
        None => Error::NotFound(format!("running task for user {user_id}")).into_response(),
    }
}
