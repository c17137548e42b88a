//! Range and series job construction, and series archives.

use crate::db::{ArchiveRecord, FileRecord, JobRecord};
use crate::error::{DownloadError, Result};
use crate::grouping::{JobSelector, partition_by_series, range_job_name, series_job_name};
use crate::types::{Event, FileStatus, HistoryAction};

use super::HarvestDownloader;

/// Files a new job may claim: not finished and not owned by the queue
fn is_submittable(file: &FileRecord) -> bool {
    matches!(file.status, FileStatus::Ready | FileStatus::Failed)
}

impl HarvestDownloader {
    /// Create and submit a range job over `start..=end`
    ///
    /// Selects every `ready` or `failed` file whose leading number lies in
    /// the window. The job is named `"<start>-<end>"`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidRange`] when `start > end`
    /// - [`DownloadError::EmptySelection`] when no file falls in the window
    pub async fn submit_range(&self, start: u64, end: u64) -> Result<JobRecord> {
        if start > end {
            return Err(DownloadError::InvalidRange { start, end }.into());
        }

        let selector = JobSelector::Range { start, end };
        let name = range_job_name(start, end);
        let files: Vec<FileRecord> = self
            .db
            .list_files()
            .await?
            .into_iter()
            .filter(|f| is_submittable(f) && selector.matches(&f.name, &self.config.grouping))
            .collect();
        if files.is_empty() {
            return Err(DownloadError::EmptySelection { selection: name }.into());
        }

        let job = self.create_job(name, files.len()).await?;
        self.submit_batch(job.id, files).await?;
        self.require_job(job.id).await
    }

    /// Partition files by series key and submit one job per series
    ///
    /// Jobs are named `"Series <key>"` and submitted in ascending key order.
    /// Files that are already completed or owned by the queue are left out.
    ///
    /// # Errors
    ///
    /// [`DownloadError::EmptySelection`] when no submittable file remains.
    pub async fn submit_by_series(&self, files: Vec<FileRecord>) -> Result<Vec<JobRecord>> {
        let submittable: Vec<FileRecord> = files.into_iter().filter(is_submittable).collect();
        if submittable.is_empty() {
            return Err(DownloadError::EmptySelection {
                selection: "series batch".to_string(),
            }
            .into());
        }

        let groups = partition_by_series(submittable, &self.config.grouping, |f| f.name.as_str());
        let mut jobs = Vec::with_capacity(groups.len());
        for (key, group) in groups {
            let job = self.create_job(series_job_name(&key), group.len()).await?;
            tracing::debug!(job_id = %job.id, series = %key, files = group.len(), "series job created");
            self.submit_batch(job.id, group).await?;
            jobs.push(self.require_job(job.id).await?);
        }
        Ok(jobs)
    }

    /// Archive the completed files of a series after the fact
    ///
    /// Writes `"Series <key>.zip"` into the archive directory and records an
    /// archive not tied to any job.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::NoArtifacts`](crate::error::ArchiveError::NoArtifacts)
    /// when the series has no completed file with a staged artifact.
    pub async fn materialize_series_archive(&self, series_key: &str) -> Result<ArchiveRecord> {
        let selector = JobSelector::Series(series_key.to_string());
        let label = series_job_name(series_key);
        let files = self.completed_files_matching(&selector).await?;

        let (archive, file_count) = self.write_archive(None, &label, &files).await?;
        self.db
            .append_history(HistoryAction::SeriesArchived, &label, file_count as i64)
            .await?;
        tracing::info!(series = %series_key, archive = %archive.filename, size = %archive.size, "series archived");
        self.emit_event(Event::SeriesArchived {
            series: series_key.to_string(),
            archive_id: archive.id,
        });

        Ok(archive)
    }
}
