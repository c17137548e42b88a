//! Database layer for harvest-dl
//!
//! The record store behind the orchestrator: SQLite persistence for file
//! records, job records, archive records and the history log.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`files`] - File record CRUD and status compare-and-swap
//! - [`jobs`] - Job record CRUD, the downloaded-file counter, status compare-and-swap
//! - [`archives`] - Archive records
//! - [`history`] - History log

use crate::error::{DownloadError, Result};
use crate::types::{ArchiveId, FileId, FileStatus, HistoryAction, HistoryEntry, JobId, JobStatus};
use crate::utils::filename_from_url;
use sqlx::{FromRow, sqlite::SqlitePool};

mod archives;
mod files;
mod history;
mod jobs;
mod migrations;

/// Size label used until a file's size is known
pub const UNKNOWN_SIZE: &str = "Unknown";

/// Size label used until a job's aggregate size is known
pub const CALCULATING_SIZE: &str = "Calculating...";

/// New file record to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Remote source URL
    pub url: String,
    /// Display name (also the staged artifact's base name)
    pub name: String,
    /// Human-readable size, if the discovery step knew it
    pub size: Option<String>,
}

impl NewFile {
    /// Describe a discovered URL, naming it after its last path segment
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let name = filename_from_url(&url).ok_or_else(|| DownloadError::InvalidUrl {
            url: url.clone(),
            reason: "no file name in URL path".to_string(),
        })?;
        Ok(Self {
            url,
            name,
            size: None,
        })
    }
}

/// File record from database
#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    /// Unique database ID
    pub id: FileId,
    /// Remote source URL
    pub url: String,
    /// Display name
    pub name: String,
    /// Human-readable size or [`UNKNOWN_SIZE`]
    pub size: String,
    /// Current fetch state
    pub status: FileStatus,
    /// Progress percentage, 0 or 100
    pub progress: i64,
    /// Unix timestamp when the file was discovered
    pub created_at: i64,
}

/// Partial update of a file record; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    /// New status
    pub status: Option<FileStatus>,
    /// New progress percentage
    pub progress: Option<i64>,
    /// New human-readable size
    pub size: Option<String>,
}

/// New job record to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Display name (encodes a "start-end" range or a series key)
    pub name: String,
    /// Number of files the job covers
    pub total_files: i64,
}

/// Job record from database
#[derive(Debug, Clone, FromRow)]
pub struct JobRecord {
    /// Unique database ID
    pub id: JobId,
    /// Display name
    pub name: String,
    /// Number of files the job covers
    pub total_files: i64,
    /// Files fetched successfully; the sole completion signal
    pub downloaded_files: i64,
    /// Human-readable aggregate size or [`CALCULATING_SIZE`]
    pub size: String,
    /// Current job state
    pub status: JobStatus,
    /// Unix timestamp when the job was created
    pub created_at: i64,
    /// Unix timestamp of the terminal transition
    pub completed_at: Option<i64>,
}

/// Partial update of a job record; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    /// New status
    pub status: Option<JobStatus>,
    /// New total file count
    pub total_files: Option<i64>,
    /// New downloaded file count
    pub downloaded_files: Option<i64>,
    /// New human-readable aggregate size
    pub size: Option<String>,
    /// New completion timestamp (`Some(None)` clears it)
    pub completed_at: Option<Option<i64>>,
}

/// New archive record to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewArchive {
    /// Job the archive was created for (`None` for series archives)
    pub job_id: Option<JobId>,
    /// Archive filename
    pub filename: String,
    /// Content summary, e.g. "12 files (Series 004)"
    pub summary: String,
    /// Compressed size in bytes
    pub size_bytes: i64,
    /// Human-readable compressed size
    pub size: String,
    /// Local path of the archive
    pub path: String,
}

/// Archive record from database
#[derive(Debug, Clone, FromRow)]
pub struct ArchiveRecord {
    /// Unique database ID
    pub id: ArchiveId,
    /// Job the archive was created for
    pub job_id: Option<JobId>,
    /// Archive filename
    pub filename: String,
    /// Content summary
    pub summary: String,
    /// Compressed size in bytes
    pub size_bytes: i64,
    /// Human-readable compressed size
    pub size: String,
    /// Local path of the archive
    pub path: String,
    /// Unix timestamp when the archive was created
    pub created_at: i64,
}

/// History record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// Unique database ID
    pub id: i64,
    /// Action text form
    pub action: String,
    /// Free-form details
    pub details: String,
    /// Number of files concerned
    pub file_count: i64,
    /// Unix timestamp of the entry
    pub created_at: i64,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        use chrono::{TimeZone, Utc};

        HistoryEntry {
            id: row.id,
            action: HistoryAction::parse(&row.action).unwrap_or(HistoryAction::JobFailed),
            details: row.details,
            file_count: row.file_count,
            created_at: Utc
                .timestamp_opt(row.created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Database handle for harvest-dl
pub struct Database {
    pool: SqlitePool,
}
