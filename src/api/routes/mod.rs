//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`tasks`] - Starting, listing and cancelling forwarding tasks
//! - [`history`] - Finished tasks
//! - [`system`] - Health, events, OpenAPI, shutdown

use serde::{Deserialize, Serialize};

use crate::types::{TaskConfig, TaskId};

mod history;
mod system;
mod tasks;

pub use history::*;
pub use system::*;
pub use tasks::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Request body for POST /tasks
///
/// Either `source` or `source_link` must be given. A link such as
/// `https://t.me/news/1500` sets the source chat and, when `limit` is omitted,
/// a limit of the linked message id plus one.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartTaskBody {
    /// Owning user
    pub user_id: i64,
    /// Source chat: numeric id or `@username`
    #[serde(default)]
    pub source: Option<String>,
    /// Link to the last message to forward
    #[serde(default)]
    pub source_link: Option<String>,
    /// Destination chat: numeric id or `@username`
    pub destination: String,
    /// First index to scan (default: 0)
    #[serde(default)]
    pub skip: u64,
    /// Exclusive upper bound of indices to scan
    #[serde(default)]
    pub limit: Option<u64>,
    /// Task id nonce (default: current time in ms)
    #[serde(default)]
    pub nonce: Option<i64>,
    /// Filter, caption and dispatch settings
    #[serde(default)]
    pub config: TaskConfig,
}

/// Response for POST /tasks and DELETE /users/:user_id/task
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct TaskIdResponse {
    /// Identifier of the affected task
    pub task_id: TaskId,
}

/// Query parameters for GET /history
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct HistoryQuery {
    /// Maximum number of items to return (default: 50)
    pub limit: Option<i64>,
    /// Number of items to skip (default: 0)
    pub offset: Option<i64>,
}
