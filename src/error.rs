//! Error types for harvest-dl
//!
//! This module provides the error hierarchy for the library:
//! - [`Error`] is the crate-wide error returned by every public operation
//! - [`DatabaseError`] covers record store failures
//! - [`DownloadError`] covers queue, fetch and state-machine failures
//! - [`ArchiveError`] covers the job-completion archive handoff

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{FileId, FileStatus, JobId};

/// Result type alias for harvest-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for harvest-dl
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_downloads")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Archive handoff error
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new batches
    #[error("shutdown in progress: not accepting new batches")]
    ShuttingDown,
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Queue and fetch errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Job not found in the record store
    #[error("job {id} not found")]
    JobNotFound {
        /// The job ID that was not found
        id: JobId,
    },

    /// A file was not in the state its transition requires
    #[error("file {file_id} expected to be {expected} but was {actual}")]
    InvalidTransition {
        /// The file whose transition was refused
        file_id: FileId,
        /// The state the transition starts from
        expected: FileStatus,
        /// The state the file was actually in
        actual: FileStatus,
    },

    /// Remote source answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that was requested
        url: String,
        /// The HTTP status code returned
        status: u16,
    },

    /// URL could not be parsed
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The URL as given
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} job {id} in state {current_state}")]
    InvalidState {
        /// The job that is in an invalid state for the operation
        id: JobId,
        /// The operation that was attempted (e.g., "retry", "cancel")
        operation: String,
        /// The state that prevents the operation
        current_state: String,
    },

    /// Range window with its bounds reversed
    #[error("invalid range {start}-{end}: start is after end")]
    InvalidRange {
        /// First number of the window
        start: u64,
        /// Last number of the window
        end: u64,
    },

    /// No file matched a submission request
    #[error("no submittable files match {selection}")]
    EmptySelection {
        /// Job display name or series key that selected nothing
        selection: String,
    },

    /// File is owned by the queue and cannot be modified by the caller
    #[error("file {id} is busy ({status})")]
    FileBusy {
        /// The busy file
        id: FileId,
        /// Its current status
        status: FileStatus,
    },
}

/// Archive handoff errors (job completion, series materialization)
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// No staged artifacts could be resolved for the group
    #[error("no staged artifacts found for {group}")]
    NoArtifacts {
        /// Job or series display name
        group: String,
    },

    /// The compression step failed
    #[error("failed to create archive {path}: {reason}")]
    CreationFailed {
        /// Output path of the archive
        path: PathBuf,
        /// The reason creation failed
        reason: String,
    },

    /// The job display name encodes neither a range nor a series
    #[error("job name {name:?} encodes neither a range nor a series")]
    UnparseableJobName {
        /// The display name that could not be parsed
        name: String,
    },
}
