//! History of finished tasks.

use crate::types::HistoryEntry;
use crate::{Error, Result};

use super::{Database, HistoryRow, NewHistoryEntry};

impl Database {
    /// Insert a finished task into history
    pub async fn insert_history(&self, entry: &NewHistoryEntry) -> Result<i64> {
        let s = &entry.snapshot;
        let result = sqlx::query(
            r#"
            INSERT INTO task_history (
                task_id, user_id, source, destination, status,
                fetched, total, dispatched, duplicate, filtered, deleted,
                error, started_at, finished_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&s.task_id)
        .bind(s.user_id)
        .bind(s.source.to_string())
        .bind(s.destination.to_string())
        .bind(entry.status.to_i32())
        .bind(s.fetched as i64)
        .bind(s.total as i64)
        .bind(s.dispatched as i64)
        .bind(s.duplicate as i64)
        .bind(s.filtered as i64)
        .bind(s.deleted as i64)
        .bind(&entry.error)
        .bind(s.started_at.map(|t| t.timestamp()))
        .bind(entry.finished_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Query history, most recently finished first
    pub async fn query_history(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, task_id, user_id, source, destination, status,
                   fetched, total, dispatched, duplicate, filtered, deleted,
                   error, started_at, finished_at
            FROM task_history
            ORDER BY finished_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    /// Count history entries
    pub async fn count_history(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM task_history")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(count)
    }

    /// Delete all history entries, returning how many were removed
    pub async fn clear_history(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM task_history")
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }
}
