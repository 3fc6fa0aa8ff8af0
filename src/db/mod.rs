//! Database layer for chat-forwarder
//!
//! Handles SQLite persistence for active task snapshots, task history and
//! runtime state.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: database lifecycle, schema migrations
//! - [`tasks`]: active task snapshots used for crash recovery
//! - [`history`]: finished tasks
//! - [`state`]: runtime state (shutdown tracking)
//!
//! [`SqliteDedupStore`] lives here too but owns its own pool, since the dedup
//! store of a task may point at a different database file.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

use crate::types::{
    ChatRef, HistoryEntry, ProgressSnapshot, TaskConfig, TaskId, TaskStatus, UserId,
};

mod dedup_store;
mod history;
mod migrations;
mod state;
mod tasks;

pub use dedup_store::SqliteDedupStore;

/// Active task record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct ActiveTaskRow {
    /// Task identifier
    pub task_id: String,
    /// Owning user
    pub user_id: i64,
    /// Source chat, as displayed
    pub source: String,
    /// Destination chat, as displayed
    pub destination: String,
    /// First index of the range
    pub skip_index: i64,
    /// Exclusive upper bound of the range
    pub limit_index: i64,
    /// Indices scanned
    pub fetched: i64,
    /// Progress denominator
    pub total: i64,
    /// Messages delivered
    pub dispatched: i64,
    /// Duplicates skipped
    pub duplicate: i64,
    /// Messages rejected by filters
    pub filtered: i64,
    /// Unusable messages and failed dispatches
    pub deleted: i64,
    /// Unix timestamp when the task entered Running
    pub started_at: Option<i64>,
    /// Serialized [`TaskConfig`]
    pub config_json: String,
    /// Unix timestamp of the last snapshot write
    pub updated_at: i64,
}

impl ActiveTaskRow {
    /// Decode the row into a snapshot and its task configuration
    ///
    /// Fails with a human-readable reason when the persisted endpoints, range
    /// or configuration can no longer be used.
    pub fn decode(&self) -> std::result::Result<(ProgressSnapshot, TaskConfig), String> {
        let source: ChatRef = self
            .source
            .parse()
            .map_err(|e| format!("source is invalid: {e}"))?;
        let destination: ChatRef = self
            .destination
            .parse()
            .map_err(|e| format!("destination is invalid: {e}"))?;

        if self.skip_index < 0 || self.limit_index < self.skip_index {
            return Err(format!(
                "range is invalid: skip {} limit {}",
                self.skip_index, self.limit_index
            ));
        }
        if self.fetched < self.skip_index || self.fetched > self.limit_index {
            return Err(format!(
                "fetched {} is outside range {}..{}",
                self.fetched, self.skip_index, self.limit_index
            ));
        }

        let config: TaskConfig = serde_json::from_str(&self.config_json)
            .map_err(|e| format!("task configuration is unreadable: {e}"))?;

        let snapshot = ProgressSnapshot {
            task_id: TaskId(self.task_id.clone()),
            user_id: UserId(self.user_id),
            source,
            destination,
            skip: self.skip_index as u64,
            limit: self.limit_index as u64,
            fetched: self.fetched as u64,
            total: self.total.max(0) as u64,
            dispatched: self.dispatched.max(0) as u64,
            duplicate: self.duplicate.max(0) as u64,
            filtered: self.filtered.max(0) as u64,
            deleted: self.deleted.max(0) as u64,
            started_at: self.started_at.and_then(timestamp_to_datetime),
            status: TaskStatus::Running,
        };
        Ok((snapshot, config))
    }
}

/// New history entry to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    /// Final task snapshot
    pub snapshot: ProgressSnapshot,
    /// Final status (Completed, Cancelled or Failed)
    pub status: TaskStatus,
    /// Error message for failed tasks
    pub error: Option<String>,
    /// Unix timestamp when the task finished
    pub finished_at: i64,
}

/// History record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// Unique database ID
    pub id: i64,
    /// Task identifier
    pub task_id: String,
    /// Owning user
    pub user_id: i64,
    /// Source chat, as displayed
    pub source: String,
    /// Destination chat, as displayed
    pub destination: String,
    /// Final status code
    pub status: i32,
    /// Indices scanned
    pub fetched: i64,
    /// Progress denominator
    pub total: i64,
    /// Messages delivered
    pub dispatched: i64,
    /// Duplicates skipped
    pub duplicate: i64,
    /// Messages rejected by filters
    pub filtered: i64,
    /// Unusable messages and failed dispatches
    pub deleted: i64,
    /// Error message for failed tasks
    pub error: Option<String>,
    /// Unix timestamp when the task entered Running
    pub started_at: Option<i64>,
    /// Unix timestamp when the task finished
    pub finished_at: i64,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        HistoryEntry {
            id: row.id,
            task_id: TaskId(row.task_id),
            user_id: UserId(row.user_id),
            source: row.source,
            destination: row.destination,
            status: TaskStatus::from_i32(row.status),
            fetched: row.fetched.max(0) as u64,
            total: row.total.max(0) as u64,
            dispatched: row.dispatched.max(0) as u64,
            duplicate: row.duplicate.max(0) as u64,
            filtered: row.filtered.max(0) as u64,
            deleted: row.deleted.max(0) as u64,
            error: row.error,
            started_at: row.started_at.and_then(timestamp_to_datetime),
            finished_at: timestamp_to_datetime(row.finished_at).unwrap_or_else(Utc::now),
        }
    }
}

fn timestamp_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Database handle for chat-forwarder
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
