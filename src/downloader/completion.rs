//! Job completion detection and the archive handoff.
//!
//! A job is complete when its downloaded-file counter reaches its total. The
//! archive step may be requested by a fetch task and by a retry for the same
//! job, so entry into `creating zip` is a compare-and-swap on `in progress`
//! taken under the scheduler lock, and every later invocation is a no-op.

use std::path::PathBuf;

use crate::db::{ArchiveRecord, FileRecord, JobUpdate, NewArchive};
use crate::error::{ArchiveError, Error, Result};
use crate::grouping::{JobSelector, parse_job_name};
use crate::staging;
use crate::types::{ArchiveId, Event, FileStatus, HistoryAction, JobId, JobStatus};
use crate::utils::{format_size, sanitize_archive_name};

use super::HarvestDownloader;

impl HarvestDownloader {
    /// Archive a job whose files are all fetched
    ///
    /// Returns `None` without side effects unless the job is `in progress`;
    /// this makes repeated or concurrent invocations for the same job safe.
    /// Archive failures are recorded on the job (`failed` plus a history
    /// entry) rather than returned.
    pub(crate) async fn complete_job(&self, job_id: JobId) -> Result<Option<ArchiveId>> {
        let job = self.require_job(job_id).await?;
        {
            let mut scheduler = self.queue_state.scheduler.lock().await;
            if !self
                .db
                .transition_job(job_id, JobStatus::InProgress, JobStatus::CreatingZip)
                .await?
            {
                tracing::debug!(job_id = %job_id, "job no longer in progress, archive step skipped");
                return Ok(None);
            }
            scheduler.job_tokens.remove(&job_id);
        }
        self.emit_event(Event::JobArchiving { job_id });

        match self.archive_job_files(job_id, &job.name).await {
            Ok((archive, file_count)) => {
                self.db
                    .update_job(
                        job_id,
                        &JobUpdate {
                            size: Some(archive.size.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.db
                    .transition_job(job_id, JobStatus::CreatingZip, JobStatus::Completed)
                    .await?;
                self.db
                    .append_history(HistoryAction::JobCompleted, &job.name, file_count as i64)
                    .await?;

                tracing::info!(
                    job_id = %job_id,
                    job = %job.name,
                    archive = %archive.filename,
                    size = %archive.size,
                    "job archived"
                );
                self.emit_event(Event::JobCompleted {
                    job_id,
                    archive_id: archive.id,
                });
                Ok(Some(archive.id))
            }
            Err(e) => {
                self.db
                    .transition_job(job_id, JobStatus::CreatingZip, JobStatus::Failed)
                    .await?;
                self.db
                    .append_history(
                        HistoryAction::JobFailed,
                        &format!("{}: {}", job.name, e),
                        job.total_files,
                    )
                    .await?;

                tracing::error!(job_id = %job_id, job = %job.name, error = %e, "job archive failed");
                self.emit_event(Event::JobFailed {
                    job_id,
                    error: e.to_string(),
                });
                Ok(None)
            }
        }
    }

    async fn archive_job_files(
        &self,
        job_id: JobId,
        job_name: &str,
    ) -> Result<(ArchiveRecord, usize)> {
        let selector = parse_job_name(job_name);
        if selector == JobSelector::Unparseable {
            return Err(ArchiveError::UnparseableJobName {
                name: job_name.to_string(),
            }
            .into());
        }

        let files = self.completed_files_matching(&selector).await?;
        self.write_archive(Some(job_id), job_name, &files).await
    }

    /// Completed files selected by a job name or series key
    pub(crate) async fn completed_files_matching(
        &self,
        selector: &JobSelector,
    ) -> Result<Vec<FileRecord>> {
        let files = self.db.list_files_by_status(FileStatus::Completed).await?;
        Ok(files
            .into_iter()
            .filter(|f| selector.matches(&f.name, &self.config.grouping))
            .collect())
    }

    /// Resolve staged artifacts for `files`, pack them and record the archive
    ///
    /// Files without a non-empty staged copy are skipped; if none remain the
    /// archive is not created. Returns the record and the number of files
    /// packed.
    pub(crate) async fn write_archive(
        &self,
        job_id: Option<JobId>,
        label: &str,
        files: &[FileRecord],
    ) -> Result<(ArchiveRecord, usize)> {
        let mut artifacts: Vec<PathBuf> = Vec::with_capacity(files.len());
        for file in files {
            match staging::locate_artifact(&self.config.download.staging_dir, &file.name).await? {
                Some(path) => artifacts.push(path),
                None => tracing::warn!(file_id = %file.id, name = %file.name, "no staged artifact, file skipped"),
            }
        }
        if artifacts.is_empty() {
            return Err(ArchiveError::NoArtifacts {
                group: label.to_string(),
            }
            .into());
        }

        let filename = format!("{}.zip", sanitize_archive_name(label));
        let output = self.config.download.archive_dir.join(&filename);
        let size_bytes = self.archiver.archive(&artifacts, &output).await?;
        let size = format_size(size_bytes);

        let id = self
            .db
            .insert_archive(&NewArchive {
                job_id,
                filename,
                summary: format!("{} files ({})", artifacts.len(), label),
                size_bytes: i64::try_from(size_bytes).unwrap_or(i64::MAX),
                size,
                path: output.to_string_lossy().into_owned(),
            })
            .await?;

        if self.config.download.remove_staged_after_archive {
            staging::remove_all(&artifacts).await;
        }

        let record = self
            .db
            .get_archive(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("archive {}", id)))?;
        Ok((record, artifacts.len()))
    }
}
