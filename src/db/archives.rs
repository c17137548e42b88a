//! Archive record operations.
//!
//! Archive records are immutable once written: there is no update path.

use crate::error::DatabaseError;
use crate::types::ArchiveId;
use crate::{Error, Result};

use super::{ArchiveRecord, Database, NewArchive};

const ARCHIVE_COLUMNS: &str = "id, job_id, filename, summary, size_bytes, size, path, created_at";

impl Database {
    /// Insert an archive record
    pub async fn insert_archive(&self, archive: &NewArchive) -> Result<ArchiveId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO archives (job_id, filename, summary, size_bytes, size, path, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(archive.job_id)
        .bind(&archive.filename)
        .bind(&archive.summary)
        .bind(archive.size_bytes)
        .bind(&archive.size)
        .bind(&archive.path)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert archive: {}",
                e
            )))
        })?;

        Ok(ArchiveId(result.last_insert_rowid()))
    }

    /// Get an archive record by ID
    pub async fn get_archive(&self, id: ArchiveId) -> Result<Option<ArchiveRecord>> {
        let row = sqlx::query_as::<_, ArchiveRecord>(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archives WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get archive: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all archive records, newest first
    pub async fn list_archives(&self) -> Result<Vec<ArchiveRecord>> {
        let rows = sqlx::query_as::<_, ArchiveRecord>(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archives ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list archives: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
