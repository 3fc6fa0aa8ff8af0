//! SQLite-backed [`DedupStore`].

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use crate::dedup::DedupStore;
use crate::error::DatabaseError;
use crate::types::ContentSignature;
use crate::{Error, Result};

/// Dedup signatures of one scope, stored in a SQLite database of their own
pub struct SqliteDedupStore {
    pool: SqlitePool,
    scope: String,
}

impl SqliteDedupStore {
    /// Open (or create) the store at `url` for one scope
    ///
    /// `url` is a sqlx SQLite URL such as `sqlite:/var/lib/fwd/dedup.db`.
    pub async fn connect(url: &str, scope: impl Into<String>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse dedup store URL: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to dedup store: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dedup_signatures (
                scope TEXT NOT NULL,
                signature TEXT NOT NULL,
                added_at INTEGER NOT NULL,
                PRIMARY KEY (scope, signature)
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create dedup_signatures table: {}",
                e
            )))
        })?;

        Ok(Self {
            pool,
            scope: scope.into(),
        })
    }

    /// Scope this store reads and writes
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn add(&self, signature: &ContentSignature) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO dedup_signatures (scope, signature, added_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&self.scope)
        .bind(signature.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to add dedup signature: {}",
                e
            )))
        })?;

        Ok(())
    }

    async fn contains(&self, signature: &ContentSignature) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM dedup_signatures WHERE scope = ? AND signature = ?",
        )
        .bind(&self.scope)
        .bind(signature.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check dedup signature: {}",
                e
            )))
        })?;

        Ok(count > 0)
    }

    async fn list_all(&self) -> Result<Vec<ContentSignature>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT signature FROM dedup_signatures WHERE scope = ?")
                .bind(&self.scope)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to list dedup signatures: {}",
                        e
                    )))
                })?;

        Ok(rows.into_iter().map(ContentSignature).collect())
    }

    async fn drop_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM dedup_signatures WHERE scope = ?")
            .bind(&self.scope)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to drop dedup signatures: {}",
                    e
                )))
            })?;

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
