//! Startup recovery and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::{Event, FileStatus, HistoryAction, JobStatus};

use super::{HarvestDownloader, QueueEntry};

/// Interval between checks while waiting for in-flight fetches
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl HarvestDownloader {
    /// Reset state left behind by a process that stopped mid-work
    ///
    /// - files left `queued` or `downloading` go back to `ready`
    /// - jobs left `creating zip` are marked `failed` (their archive step was cut short)
    /// - `in progress` jobs are kept; [`retry_job`](Self::retry_job) resumes them
    pub(crate) async fn recover_interrupted(&self) -> Result<()> {
        let reset = self.db.reset_interrupted_files().await?;
        if reset > 0 {
            tracing::info!(files = reset, "reset interrupted files to ready");
        }

        for job in self.db.list_jobs_by_status(JobStatus::CreatingZip).await? {
            if self
                .db
                .transition_job(job.id, JobStatus::CreatingZip, JobStatus::Failed)
                .await?
            {
                self.db
                    .append_history(
                        HistoryAction::JobFailed,
                        &format!("{}: interrupted while creating archive", job.name),
                        job.total_files,
                    )
                    .await?;
                tracing::warn!(job_id = %job.id, job = %job.name, "archive step was interrupted, job marked failed");
            }
        }

        let resumable = self.db.list_jobs_by_status(JobStatus::InProgress).await?;
        if !resumable.is_empty() {
            tracing::info!(jobs = resumable.len(), "in-progress jobs found, resume them with retry_job");
        }

        Ok(())
    }

    /// Gracefully shut down the downloader
    ///
    /// 1. Stops accepting batches and admitting queue entries
    /// 2. Returns still-pending files to `ready`
    /// 3. Waits, bounded by `shutdown_timeout`, for in-flight fetches to finish
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// # Errors
    ///
    /// Returns an error if releasing pending files fails.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        let pending: Vec<QueueEntry> = {
            let mut scheduler = self.queue_state.scheduler.lock().await;
            self.queue_state
                .accepting_new
                .store(false, Ordering::SeqCst);
            scheduler.pending.drain(..).collect()
        };
        tracing::info!(released = pending.len(), "Stopped accepting new batches");

        for entry in &pending {
            self.db
                .transition_file(entry.file.id, FileStatus::Queued, FileStatus::Ready, 0)
                .await?;
        }

        match tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_active_fetches())
            .await
        {
            Ok(()) => tracing::info!("All in-flight fetches finished"),
            Err(_) => tracing::warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Timeout waiting for in-flight fetches, proceeding with shutdown"
            ),
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_fetches(&self) {
        loop {
            let active = self.active_count().await;
            if active == 0 {
                return;
            }
            tracing::debug!(active, "Waiting for in-flight fetches");
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
        }
    }
}
