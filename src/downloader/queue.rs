//! Batch submission and admission-controlled queue draining.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use crate::db::{FileRecord, FileUpdate, JobUpdate};
use crate::error::{DownloadError, Error, Result};
use crate::types::{Event, FileStatus, HistoryAction, JobId, JobStatus};

use super::{HarvestDownloader, QueueEntry};

impl HarvestDownloader {
    /// Submit a batch of files to be fetched under `job_id`
    ///
    /// Every file is marked `queued` and appended to the tail of the pending
    /// queue (FIFO across all jobs), the job moves to `in progress`, and the
    /// queue is drained immediately. Safe to call while other batches are
    /// still draining.
    ///
    /// Completion is reported through [`subscribe`](Self::subscribe) events
    /// rather than by this call, which returns once the batch is enqueued.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    /// - [`DownloadError::JobNotFound`] for an unknown job
    /// - [`DownloadError::InvalidState`] unless the job is `queued` or `in progress`;
    ///   stopped jobs go through [`retry_job`](Self::retry_job)
    /// - [`DownloadError::FileBusy`] when a file is already queued or downloading
    /// - [`DownloadError::EmptySelection`] for an empty batch
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use harvest_dl::*;
    /// # async fn example(downloader: HarvestDownloader) -> Result<()> {
    /// let files = downloader
    ///     .add_files(vec![NewFile::from_url("https://example.com/docs/001_agenda.pdf")?])
    ///     .await?;
    /// let job = downloader.create_job("1-1", files.len()).await?;
    /// downloader.submit_batch(job.id, files).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_batch(&self, job_id: JobId, files: Vec<FileRecord>) -> Result<()> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let (job, queued) = {
            // Validation, marking and enqueueing happen under the scheduler lock
            // so two submissions can never both claim the same file, and a
            // concurrent cancel or archive step cannot change the job under us.
            let mut scheduler = self.queue_state.scheduler.lock().await;

            let job = self.require_job(job_id).await?;
            // A stopped job's counter is stale; `retry_job` resets it first.
            if !matches!(job.status, JobStatus::Queued | JobStatus::InProgress) {
                return Err(DownloadError::InvalidState {
                    id: job_id,
                    operation: "submit".to_string(),
                    current_state: job.status.to_string(),
                }
                .into());
            }
            if files.is_empty() {
                return Err(DownloadError::EmptySelection { selection: job.name }.into());
            }

            let mut seen = HashSet::new();
            let mut batch = Vec::with_capacity(files.len());
            for file in files {
                if !seen.insert(file.id) {
                    tracing::debug!(file_id = %file.id, "duplicate file in batch skipped");
                    continue;
                }
                let current = self.require_file(file.id).await?;
                if matches!(current.status, FileStatus::Queued | FileStatus::Downloading) {
                    return Err(DownloadError::FileBusy {
                        id: current.id,
                        status: current.status,
                    }
                    .into());
                }
                batch.push(current);
            }

            // The job must be `in progress` before any entry can be admitted,
            // otherwise a fast completion could miss its archive transition.
            if job.status != JobStatus::InProgress {
                self.db
                    .update_job(
                        job_id,
                        &JobUpdate {
                            status: Some(JobStatus::InProgress),
                            completed_at: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;
            }

            let token = scheduler.token_for(job_id);
            let before = scheduler.pending.len();
            for mut file in batch {
                self.db
                    .update_file(
                        file.id,
                        &FileUpdate {
                            status: Some(FileStatus::Queued),
                            progress: Some(0),
                            ..Default::default()
                        },
                    )
                    .await?;
                file.status = FileStatus::Queued;
                file.progress = 0;
                scheduler.pending.push_back(QueueEntry {
                    job_id,
                    file,
                    token: token.clone(),
                });
            }
            (job, scheduler.pending.len() - before)
        };

        self.db
            .append_history(HistoryAction::BatchSubmitted, &job.name, queued as i64)
            .await?;
        tracing::info!(job_id = %job_id, job = %job.name, files = queued, "batch submitted");
        self.emit_event(Event::JobQueued {
            job_id,
            files: queued,
        });

        self.drain_queue().await;
        Ok(())
    }

    /// Admit pending entries while worker slots are free
    ///
    /// Entries whose job generation was cancelled are dropped at dequeue time
    /// and their files returned to `ready`. Nothing is admitted once shutdown
    /// has begun.
    pub(crate) async fn drain_queue(&self) {
        let capacity = self.config.download.max_concurrent_downloads;
        let mut admitted = Vec::new();
        let mut dropped = Vec::new();
        {
            let mut scheduler = self.queue_state.scheduler.lock().await;
            if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
                return;
            }
            while scheduler.active < capacity {
                let Some(entry) = scheduler.pending.pop_front() else {
                    break;
                };
                if entry.token.is_cancelled() {
                    dropped.push(entry);
                    continue;
                }
                scheduler.active += 1;
                admitted.push(entry);
            }
        }

        for entry in dropped {
            tracing::debug!(
                job_id = %entry.job_id,
                file_id = %entry.file.id,
                "dropping entry of cancelled job at dequeue"
            );
            if let Err(e) = self
                .db
                .transition_file(entry.file.id, FileStatus::Queued, FileStatus::Ready, 0)
                .await
            {
                tracing::error!(file_id = %entry.file.id, error = %e, "failed to release dropped file");
            }
        }

        for entry in admitted {
            tracing::debug!(
                job_id = %entry.job_id,
                file_id = %entry.file.id,
                "admitted queue entry"
            );
            tokio::spawn(self.clone().run_fetch(entry));
        }
    }

    /// Number of entries waiting for a worker slot
    pub async fn queue_len(&self) -> usize {
        self.queue_state.scheduler.lock().await.pending.len()
    }

    /// Number of fetches currently holding a worker slot
    pub async fn active_count(&self) -> usize {
        self.queue_state.scheduler.lock().await.active
    }
}
