//! File record CRUD operations.

use sqlx::{QueryBuilder, Sqlite};

use crate::error::DatabaseError;
use crate::types::{FileId, FileStatus};
use crate::{Error, Result};

use super::{Database, FileRecord, FileUpdate, NewFile, UNKNOWN_SIZE};

const FILE_COLUMNS: &str = "id, url, name, size, status, progress, created_at";

impl Database {
    /// Insert a newly discovered file (status `ready`, progress 0)
    pub async fn insert_file(&self, file: &NewFile) -> Result<FileId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO files (url, name, size, status, progress, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&file.url)
        .bind(&file.name)
        .bind(file.size.as_deref().unwrap_or(UNKNOWN_SIZE))
        .bind(FileStatus::Ready)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert file: {}",
                e
            )))
        })?;

        Ok(FileId(result.last_insert_rowid()))
    }

    /// Get a file by ID
    pub async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get file: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all files in discovery order
    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list files: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List files with a specific status
    pub async fn list_files_by_status(&self, status: FileStatus) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE status = ? ORDER BY id ASC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list files by status: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Apply a partial update to a file record
    pub async fn update_file(&self, id: FileId, update: &FileUpdate) -> Result<()> {
        if update.status.is_none() && update.progress.is_none() && update.size.is_none() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE files SET ");
        let mut fields = builder.separated(", ");
        if let Some(status) = update.status {
            fields.push("status = ").push_bind_unseparated(status);
        }
        if let Some(progress) = update.progress {
            fields.push("progress = ").push_bind_unseparated(progress);
        }
        if let Some(size) = &update.size {
            fields.push("size = ").push_bind_unseparated(size.clone());
        }
        builder.push(" WHERE id = ").push_bind(id);

        builder.build().execute(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update file: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Move a file from `from` to `to` only if it is currently in `from`
    ///
    /// Returns `true` when the transition happened. Progress is set alongside
    /// the status so a single statement carries the whole transition.
    pub async fn transition_file(
        &self,
        id: FileId,
        from: FileStatus,
        to: FileStatus,
        progress: i64,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE files SET status = ?, progress = ? WHERE id = ? AND status = ?")
                .bind(to)
                .bind(progress)
                .bind(id)
                .bind(from)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to transition file: {}",
                        e
                    )))
                })?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a file record
    pub async fn delete_file(&self, id: FileId) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete file: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Reset files left `queued` or `downloading` by a previous process to `ready`
    ///
    /// Returns the number of files reset.
    pub async fn reset_interrupted_files(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE files SET status = ?, progress = 0 WHERE status IN (?, ?)",
        )
        .bind(FileStatus::Ready)
        .bind(FileStatus::Queued)
        .bind(FileStatus::Downloading)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset interrupted files: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}
