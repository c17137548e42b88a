//! Job and file control: record creation, cancellation, retry and deletion.

use std::collections::VecDeque;

use crate::db::{CALCULATING_SIZE, FileRecord, JobRecord, JobUpdate, NewFile, NewJob};
use crate::error::{ArchiveError, DatabaseError, DownloadError, Error, Result};
use crate::grouping::{JobSelector, parse_job_name};
use crate::types::{Event, FileId, FileStatus, HistoryAction, JobId, JobStatus};

use super::{HarvestDownloader, QueueEntry};

impl HarvestDownloader {
    /// Record discovered files (status `ready`)
    ///
    /// Files without a known size are stored with size `"Unknown"`, backfilled
    /// after a successful fetch.
    pub async fn add_files(&self, files: Vec<NewFile>) -> Result<Vec<FileRecord>> {
        let mut records = Vec::with_capacity(files.len());
        for file in &files {
            let id = self.db.insert_file(file).await?;
            records.push(self.require_file(id).await?);
        }
        tracing::debug!(count = records.len(), "files recorded");
        Ok(records)
    }

    /// Create a job record (status `queued`, size `"Calculating..."`)
    ///
    /// The display name should encode a `"start-end"` range or a
    /// `"Series <key>"` so the job's files can be re-derived for archiving and
    /// retry.
    pub async fn create_job(&self, name: impl Into<String>, total_files: usize) -> Result<JobRecord> {
        let name = name.into();
        if parse_job_name(&name) == JobSelector::Unparseable {
            tracing::warn!(job = %name, "job name encodes neither a range nor a series, it cannot be archived");
        }
        let id = self
            .db
            .insert_job(&NewJob {
                name,
                total_files: total_files as i64,
            })
            .await?;
        self.require_job(id).await
    }

    /// Cancel a job
    ///
    /// Removes the job's not-yet-started entries from the pending queue and
    /// returns their files to `ready`. In-flight fetches are not aborted;
    /// their results are discarded when they finish. The job is marked
    /// `cancelled` immediately.
    ///
    /// Returns the number of queue entries removed.
    ///
    /// # Errors
    ///
    /// [`DownloadError::InvalidState`] when the job is archiving or already
    /// in a terminal state.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use harvest_dl::*;
    /// # async fn example(downloader: HarvestDownloader, job_id: JobId) -> Result<()> {
    /// let removed = downloader.cancel(job_id).await?;
    /// println!("{} files never started", removed);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel(&self, job_id: JobId) -> Result<usize> {
        let (job, removed) = {
            // The status check, the status change and the queue purge form one
            // step relative to submission, counting and the archive handoff.
            let mut scheduler = self.queue_state.scheduler.lock().await;

            let job = self.require_job(job_id).await?;
            if !matches!(job.status, JobStatus::Queued | JobStatus::InProgress)
                || !self
                    .db
                    .transition_job(job_id, job.status, JobStatus::Cancelled)
                    .await?
            {
                return Err(invalid_state(job_id, "cancel", job.status));
            }

            if let Some(token) = scheduler.job_tokens.remove(&job_id) {
                token.cancel();
            }
            let (removed, kept): (VecDeque<_>, VecDeque<_>) = scheduler
                .pending
                .drain(..)
                .partition(|entry| entry.job_id == job_id);
            scheduler.pending = kept;

            for entry in &removed {
                if let Err(e) = self
                    .db
                    .transition_file(entry.file.id, FileStatus::Queued, FileStatus::Ready, 0)
                    .await
                {
                    tracing::error!(file_id = %entry.file.id, error = %e, "failed to release cancelled file");
                }
            }
            (job, Vec::from(removed))
        };

        self.db
            .append_history(HistoryAction::JobCancelled, &job.name, removed.len() as i64)
            .await?;
        tracing::info!(
            job_id = %job_id,
            job = %job.name,
            removed = removed.len(),
            in_flight = self.active_fetches_for(job_id).await,
            "job cancelled"
        );
        self.emit_event(Event::JobCancelled {
            job_id,
            removed: removed.len(),
        });

        Ok(removed.len())
    }

    /// Resubmit the unfinished files of a job
    ///
    /// The job's files are re-derived from its name. Files already
    /// `completed` count towards the reset downloaded counter; `ready` and
    /// `failed` files are submitted again. Allowed from `in progress`,
    /// `failed` and `cancelled`. When nothing is left to fetch the job goes
    /// straight to archiving.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidState`] from any other job state
    /// - [`ArchiveError::UnparseableJobName`] when the name selects nothing
    /// - [`DownloadError::FileBusy`] when a file of a stopped job is still in flight
    /// - [`DownloadError::EmptySelection`] when no file matches the job
    pub async fn retry_job(&self, job_id: JobId) -> Result<JobRecord> {
        let (job, matched, completed, resubmit) = {
            // Held until the counter is reset, so no completion can be counted
            // between reading the file states and writing the counter.
            let _scheduler = self.queue_state.scheduler.lock().await;

            let job = self.require_job(job_id).await?;
            if !matches!(
                job.status,
                JobStatus::InProgress | JobStatus::Failed | JobStatus::Cancelled
            ) {
                return Err(invalid_state(job_id, "retry", job.status));
            }

            let selector = parse_job_name(&job.name);
            if selector == JobSelector::Unparseable {
                return Err(ArchiveError::UnparseableJobName { name: job.name }.into());
            }

            let matched: Vec<FileRecord> = self
                .db
                .list_files()
                .await?
                .into_iter()
                .filter(|f| selector.matches(&f.name, &self.config.grouping))
                .collect();
            if matched.is_empty() {
                return Err(DownloadError::EmptySelection { selection: job.name }.into());
            }

            // An in-progress job still owns its in-flight files; a stopped job's
            // in-flight files will be discarded, so they cannot be counted.
            if job.status != JobStatus::InProgress
                && let Some(busy) = matched
                    .iter()
                    .find(|f| matches!(f.status, FileStatus::Queued | FileStatus::Downloading))
            {
                return Err(DownloadError::FileBusy {
                    id: busy.id,
                    status: busy.status,
                }
                .into());
            }

            let completed = matched
                .iter()
                .filter(|f| f.status == FileStatus::Completed)
                .count();
            let resubmit: Vec<FileRecord> = matched
                .iter()
                .filter(|f| matches!(f.status, FileStatus::Ready | FileStatus::Failed))
                .cloned()
                .collect();

            self.db
                .update_job(
                    job_id,
                    &JobUpdate {
                        status: Some(JobStatus::InProgress),
                        total_files: Some(matched.len() as i64),
                        downloaded_files: Some(completed as i64),
                        size: Some(CALCULATING_SIZE.to_string()),
                        completed_at: Some(None),
                    },
                )
                .await?;
            (job, matched.len(), completed, resubmit)
        };

        self.db
            .append_history(HistoryAction::JobRetried, &job.name, resubmit.len() as i64)
            .await?;
        tracing::info!(
            job_id = %job_id,
            job = %job.name,
            resubmitted = resubmit.len(),
            already_completed = completed,
            "retrying job"
        );

        if !resubmit.is_empty() {
            self.submit_batch(job_id, resubmit).await?;
        } else if completed == matched {
            self.complete_job(job_id).await?;
        }

        self.require_job(job_id).await
    }

    /// Delete a file record
    ///
    /// # Errors
    ///
    /// [`DownloadError::FileBusy`] while the file is queued or downloading.
    pub async fn delete_file(&self, file_id: FileId) -> Result<()> {
        let file = self.require_file(file_id).await?;
        if matches!(file.status, FileStatus::Queued | FileStatus::Downloading) {
            return Err(DownloadError::FileBusy {
                id: file_id,
                status: file.status,
            }
            .into());
        }

        self.db.delete_file(file_id).await?;
        self.db
            .append_history(HistoryAction::FileDeleted, &file.name, 1)
            .await?;
        tracing::info!(file_id = %file_id, name = %file.name, "file deleted");
        Ok(())
    }

    pub(crate) async fn require_job(&self, id: JobId) -> Result<JobRecord> {
        self.db
            .get_job(id)
            .await?
            .ok_or_else(|| DownloadError::JobNotFound { id }.into())
    }

    pub(crate) async fn require_file(&self, id: FileId) -> Result<FileRecord> {
        self.db.get_file(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!("File {} not found", id)))
        })
    }
}

fn invalid_state(id: JobId, operation: &str, status: JobStatus) -> Error {
    DownloadError::InvalidState {
        id,
        operation: operation.to_string(),
        current_state: status.to_string(),
    }
    .into()
}
