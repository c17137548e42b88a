//! Per-file fetch lifecycle: `queued → downloading → {completed | failed}`,
//! or back to `ready` when the owning job was cancelled mid-flight.

use futures::future::BoxFuture;

use crate::db::{FileUpdate, UNKNOWN_SIZE};
use crate::error::{DownloadError, Result};
use crate::staging;
use crate::types::{Event, FileStatus};
use crate::utils::format_size;

use super::{HarvestDownloader, QueueEntry};

/// How a fetch attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOutcome {
    /// Staged and counted; `archive_ready` when this file filled the job
    Completed { archive_ready: bool },
    /// Fetch error recorded on the file
    Failed,
    /// Result dropped because the job was cancelled
    Discarded,
    /// The entry was not in a dequeueable state; no fetch was started
    Rejected,
}

impl HarvestDownloader {
    /// Run one admitted queue entry to completion and free its worker slot
    ///
    /// Boxed so the drain → fetch → drain cycle has a nameable future type.
    pub(crate) fn run_fetch(self, entry: QueueEntry) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let job_id = entry.job_id;
            let file_id = entry.file.id;

            let outcome = match self.fetch_entry(entry).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(job_id = %job_id, file_id = %file_id, error = %e, "fetch task failed");
                    // Never leave the file parked in `downloading`
                    match self
                        .db
                        .transition_file(file_id, FileStatus::Downloading, FileStatus::Failed, 0)
                        .await
                    {
                        Ok(true) => self.emit_event(Event::FileFailed {
                            job_id,
                            file_id,
                            error: e.to_string(),
                        }),
                        Ok(false) => {}
                        Err(e) => {
                            tracing::error!(file_id = %file_id, error = %e, "failed to release file after fetch task error")
                        }
                    }
                    FetchOutcome::Failed
                }
            };

            {
                let mut scheduler = self.queue_state.scheduler.lock().await;
                scheduler.active = scheduler.active.saturating_sub(1);
            }
            self.drain_queue().await;

            if matches!(outcome, FetchOutcome::Completed { archive_ready: true })
                && let Err(e) = self.complete_job(job_id).await
            {
                tracing::error!(job_id = %job_id, error = %e, "job completion handling failed");
            }
        })
    }

    async fn fetch_entry(&self, entry: QueueEntry) -> Result<FetchOutcome> {
        let QueueEntry {
            job_id,
            file,
            token,
        } = entry;

        if !self
            .db
            .transition_file(file.id, FileStatus::Queued, FileStatus::Downloading, 0)
            .await?
        {
            let actual = self
                .db
                .get_file(file.id)
                .await?
                .map(|f| f.status)
                .unwrap_or(FileStatus::Failed);
            let err = DownloadError::InvalidTransition {
                file_id: file.id,
                expected: FileStatus::Queued,
                actual,
            };
            tracing::error!(job_id = %job_id, file_id = %file.id, error = %err, "illegal dequeue, fetch not started");
            return Ok(FetchOutcome::Rejected);
        }

        tracing::info!(job_id = %job_id, file_id = %file.id, name = %file.name, "fetch started");
        self.emit_event(Event::FileStarted {
            job_id,
            file_id: file.id,
        });

        let dest = staging::staged_path(&self.config.download.staging_dir, &file.name);
        let transferred = self.track_start(job_id, file.id).await;
        let result = self.fetcher.fetch(&file.url, &dest, &transferred).await;
        self.track_finish(file.id).await;

        // Counting a completion and cancelling the job both happen under the
        // scheduler lock, so a result is either counted or discarded.
        let scheduler = self.queue_state.scheduler.lock().await;
        if token.is_cancelled() {
            drop(scheduler);
            staging::discard(&dest).await;
            self.db
                .transition_file(file.id, FileStatus::Downloading, FileStatus::Ready, 0)
                .await?;
            tracing::info!(job_id = %job_id, file_id = %file.id, "job cancelled, fetch result discarded");
            self.emit_event(Event::FileDiscarded {
                job_id,
                file_id: file.id,
            });
            return Ok(FetchOutcome::Discarded);
        }

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(scheduler);
                staging::discard(&dest).await;
                self.db
                    .update_file(
                        file.id,
                        &FileUpdate {
                            status: Some(FileStatus::Failed),
                            progress: Some(0),
                            ..Default::default()
                        },
                    )
                    .await?;
                tracing::warn!(job_id = %job_id, file_id = %file.id, url = %file.url, error = %e, "fetch failed");
                self.emit_event(Event::FileFailed {
                    job_id,
                    file_id: file.id,
                    error: e.to_string(),
                });
                return Ok(FetchOutcome::Failed);
            }
        };

        let size = (file.size == UNKNOWN_SIZE).then(|| format_size(bytes));
        let counted = self.db.record_file_completion(file.id, job_id, size).await?;
        drop(scheduler);

        tracing::info!(job_id = %job_id, file_id = %file.id, bytes, "fetch completed");
        self.emit_event(Event::FileCompleted {
            job_id,
            file_id: file.id,
            size_bytes: bytes,
        });

        let archive_ready = match counted {
            Some((downloaded, total)) => {
                tracing::debug!(job_id = %job_id, downloaded, total, "job progress");
                downloaded == total
            }
            None => {
                tracing::warn!(job_id = %job_id, "downloaded counter already at total, increment refused");
                false
            }
        };
        Ok(FetchOutcome::Completed { archive_ready })
    }
}
