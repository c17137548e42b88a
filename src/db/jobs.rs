//! Job record CRUD, the downloaded-file counter and status compare-and-swap.

use sqlx::{QueryBuilder, Sqlite};

use crate::error::DatabaseError;
use crate::types::{FileId, FileStatus, JobId, JobStatus};
use crate::{Error, Result};

use super::{CALCULATING_SIZE, Database, JobRecord, JobUpdate, NewJob};

const JOB_COLUMNS: &str =
    "id, name, total_files, downloaded_files, size, status, created_at, completed_at";

impl Database {
    /// Insert a new job (status `queued`, size "Calculating...")
    pub async fn insert_job(&self, job: &NewJob) -> Result<JobId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (name, total_files, downloaded_files, size, status, created_at)
            VALUES (?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&job.name)
        .bind(job.total_files)
        .bind(CALCULATING_SIZE)
        .bind(JobStatus::Queued)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert job: {}",
                e
            )))
        })?;

        Ok(JobId(result.last_insert_rowid()))
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get job: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all jobs, oldest first
    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list jobs: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List jobs with a specific status
    pub async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ? ORDER BY id ASC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list jobs by status: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Apply a partial update to a job record
    pub async fn update_job(&self, id: JobId, update: &JobUpdate) -> Result<()> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE jobs SET ");
        let mut fields = builder.separated(", ");
        let mut any = false;
        if let Some(status) = update.status {
            fields.push("status = ").push_bind_unseparated(status);
            any = true;
        }
        if let Some(total) = update.total_files {
            fields.push("total_files = ").push_bind_unseparated(total);
            any = true;
        }
        if let Some(downloaded) = update.downloaded_files {
            fields.push("downloaded_files = ").push_bind_unseparated(downloaded);
            any = true;
        }
        if let Some(size) = &update.size {
            fields.push("size = ").push_bind_unseparated(size.clone());
            any = true;
        }
        if let Some(completed_at) = update.completed_at {
            fields.push("completed_at = ").push_bind_unseparated(completed_at);
            any = true;
        }
        if !any {
            return Ok(());
        }
        builder.push(" WHERE id = ").push_bind(id);

        builder.build().execute(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update job: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Mark a file `completed` and count it towards its job, atomically
    ///
    /// Both writes share one transaction, so a reader never observes a
    /// completed file that the job counter has not yet absorbed. `size`
    /// replaces the stored size when given.
    ///
    /// Returns the post-increment `(downloaded_files, total_files)` pair, or
    /// `None` when the job does not exist or the counter already equals the
    /// total (the increment is refused so the counter never exceeds it; the
    /// file is still marked).
    pub async fn record_file_completion(
        &self,
        file_id: FileId,
        job_id: JobId,
        size: Option<String>,
    ) -> Result<Option<(i64, i64)>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        sqlx::query(
            "UPDATE files SET status = ?, progress = 100, size = COALESCE(?, size) WHERE id = ?",
        )
        .bind(FileStatus::Completed)
        .bind(size)
        .bind(file_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark file completed: {}",
                e
            )))
        })?;

        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            UPDATE jobs SET downloaded_files = downloaded_files + 1
            WHERE id = ? AND downloaded_files < total_files
            RETURNING downloaded_files, total_files
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to increment downloaded files: {}",
                e
            )))
        })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit file completion: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Compare-and-swap the job status
    ///
    /// Moves the job to `to` only if it is currently `from` and returns
    /// whether the swap happened. Terminal targets stamp `completed_at`;
    /// non-terminal targets clear it.
    pub async fn transition_job(&self, id: JobId, from: JobStatus, to: JobStatus) -> Result<bool> {
        let completed_at = to
            .is_terminal()
            .then(|| chrono::Utc::now().timestamp());

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, completed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to)
        .bind(completed_at)
        .bind(id)
        .bind(from)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to transition job: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }
}
