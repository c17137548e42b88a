//! History log operations.

use crate::types::{HistoryAction, HistoryEntry};
use crate::{Error, Result};

use super::{Database, HistoryRow};

impl Database {
    /// Append an entry to the history log
    pub async fn append_history(
        &self,
        action: HistoryAction,
        details: &str,
        file_count: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO history (action, details, file_count, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(action.as_str())
        .bind(details)
        .bind(file_count)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Query history, most recent first, optionally filtered by action
    pub async fn list_history(
        &self,
        action: Option<HistoryAction>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let query = if let Some(action) = action {
            sqlx::query_as::<_, HistoryRow>(
                r#"
                SELECT id, action, details, file_count, created_at
                FROM history
                WHERE action = ?
                ORDER BY created_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(action.as_str())
            .bind(limit as i64)
            .bind(offset as i64)
        } else {
            sqlx::query_as::<_, HistoryRow>(
                r#"
                SELECT id, action, details, file_count, created_at
                FROM history
                ORDER BY created_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(limit as i64)
            .bind(offset as i64)
        };

        let rows = query.fetch_all(&self.pool).await.map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    /// Delete history entries older than the specified timestamp
    ///
    /// Returns the number of records deleted.
    pub async fn delete_history_before(&self, before_timestamp: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM history WHERE created_at < ?")
            .bind(before_timestamp)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }
}
