//! Active task snapshots, the durable mirror used for crash recovery.

use crate::error::DatabaseError;
use crate::types::{ChatRef, ProgressSnapshot, TaskConfig, TaskId, UserId};
use crate::{Error, Result};

use super::{ActiveTaskRow, Database};

impl Database {
    /// Record a task as active, together with the configuration it runs with
    ///
    /// Replaces any earlier record for the same task id.
    pub async fn insert_active_task(
        &self,
        snapshot: &ProgressSnapshot,
        config: &TaskConfig,
    ) -> Result<()> {
        let config_json = serde_json::to_string(config)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO active_tasks (
                task_id, user_id, source, destination, skip_index, limit_index,
                fetched, total, dispatched, duplicate, filtered, deleted,
                started_at, config_json, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.task_id)
        .bind(snapshot.user_id)
        .bind(snapshot.source.to_string())
        .bind(snapshot.destination.to_string())
        .bind(snapshot.skip as i64)
        .bind(snapshot.limit as i64)
        .bind(snapshot.fetched as i64)
        .bind(snapshot.total as i64)
        .bind(snapshot.dispatched as i64)
        .bind(snapshot.duplicate as i64)
        .bind(snapshot.filtered as i64)
        .bind(snapshot.deleted as i64)
        .bind(snapshot.started_at.map(|t| t.timestamp()))
        .bind(config_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert active task: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Write the latest counters of an active task
    ///
    /// A task whose record was already deleted is left alone.
    pub async fn save_snapshot(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE active_tasks
            SET fetched = ?, total = ?, dispatched = ?, duplicate = ?,
                filtered = ?, deleted = ?, started_at = ?, updated_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(snapshot.fetched as i64)
        .bind(snapshot.total as i64)
        .bind(snapshot.dispatched as i64)
        .bind(snapshot.duplicate as i64)
        .bind(snapshot.filtered as i64)
        .bind(snapshot.deleted as i64)
        .bind(snapshot.started_at.map(|t| t.timestamp()))
        .bind(now)
        .bind(&snapshot.task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save task snapshot: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Load every task that was active when the process last stopped
    pub async fn load_active_tasks(&self) -> Result<Vec<ActiveTaskRow>> {
        let rows = sqlx::query_as::<_, ActiveTaskRow>(
            r#"
            SELECT task_id, user_id, source, destination, skip_index, limit_index,
                   fetched, total, dispatched, duplicate, filtered, deleted,
                   started_at, config_json, updated_at
            FROM active_tasks
            ORDER BY updated_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load active tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Load one active task record
    pub async fn get_active_task(&self, task_id: &TaskId) -> Result<Option<ActiveTaskRow>> {
        let row = sqlx::query_as::<_, ActiveTaskRow>(
            r#"
            SELECT task_id, user_id, source, destination, skip_index, limit_index,
                   fetched, total, dispatched, duplicate, filtered, deleted,
                   started_at, config_json, updated_at
            FROM active_tasks
            WHERE task_id = ?
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get active task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Active record that still holds `user_id` or `destination`
    ///
    /// A record for the same user is preferred over one for the destination.
    pub async fn blocking_active_task(
        &self,
        user_id: UserId,
        destination: &ChatRef,
    ) -> Result<Option<ActiveTaskRow>> {
        let row = sqlx::query_as::<_, ActiveTaskRow>(
            r#"
            SELECT task_id, user_id, source, destination, skip_index, limit_index,
                   fetched, total, dispatched, duplicate, filtered, deleted,
                   started_at, config_json, updated_at
            FROM active_tasks
            WHERE user_id = ? OR destination = ?
            ORDER BY (user_id = ?) DESC, updated_at ASC
            LIMIT 1
            "#,
        )
        .bind(user_id.get())
        .bind(destination.to_string())
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to look up blocking active task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Remove a task from the active set
    pub async fn delete_snapshot(&self, task_id: &TaskId) -> Result<()> {
        sqlx::query("DELETE FROM active_tasks WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete task snapshot: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
