//! Core types for harvest-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Defines an integer-backed record identifier usable directly in sqlx queries.
macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

record_id!(
    /// Unique identifier for a discovered file
    FileId
);
record_id!(
    /// Unique identifier for a download job
    JobId
);
record_id!(
    /// Unique identifier for a created archive
    ArchiveId
);

/// Defines an enum persisted as an integer status code.
macro_rules! status_code {
    ($name:ident { $($variant:ident = $code:literal => $label:literal),+ $(,)? }) => {
        impl $name {
            /// Convert integer status code to the enum (unknown codes map to `Failed`)
            pub fn from_i32(code: i32) -> Self {
                match code {
                    $($code => $name::$variant,)+
                    _ => $name::Failed,
                }
            }

            /// Convert the enum to its integer status code
            pub fn to_i32(self) -> i32 {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            /// Human-readable label
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i32 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i32 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.to_i32(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let code = <i32 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self::from_i32(code))
            }
        }
    };
}

/// Per-file fetch state
///
/// Legal transitions: `Ready → Queued → Downloading → {Completed | Failed}`,
/// plus `Downloading → Ready` when the owning job was cancelled mid-flight and
/// `Queued → Ready` when a cancellation removes the file from the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Discovered, not part of any pending batch
    Ready,
    /// Waiting for a worker slot
    Queued,
    /// Fetch in flight
    Downloading,
    /// Fetched and staged
    Completed,
    /// Fetch failed (not retried automatically)
    Failed,
}

status_code!(FileStatus {
    Ready = 0 => "ready",
    Queued = 1 => "queued",
    Downloading = 2 => "downloading",
    Completed = 3 => "completed",
    Failed = 4 => "failed",
});

/// Job state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, no batch submitted yet
    Queued,
    /// At least one batch submitted and not yet finished
    InProgress,
    /// Every file fetched; archive being written
    CreatingZip,
    /// Archive created
    Completed,
    /// Archive step failed
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

status_code!(JobStatus {
    Queued = 0 => "queued",
    InProgress = 1 => "in progress",
    CreatingZip = 2 => "creating zip",
    Completed = 3 => "completed",
    Failed = 4 => "failed",
    Cancelled = 5 => "cancelled",
});

impl JobStatus {
    /// Whether the job has reached a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Kind of history log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    /// A batch of files was handed to the queue
    BatchSubmitted,
    /// A job's archive was created
    JobCompleted,
    /// A job's archive step failed
    JobFailed,
    /// A job was cancelled
    JobCancelled,
    /// A job was resubmitted by the caller
    JobRetried,
    /// A series archive was materialized after the fact
    SeriesArchived,
    /// A file record was deleted
    FileDeleted,
}

impl HistoryAction {
    /// Stable text form stored in the database
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAction::BatchSubmitted => "batch_submitted",
            HistoryAction::JobCompleted => "job_completed",
            HistoryAction::JobFailed => "job_failed",
            HistoryAction::JobCancelled => "job_cancelled",
            HistoryAction::JobRetried => "job_retried",
            HistoryAction::SeriesArchived => "series_archived",
            HistoryAction::FileDeleted => "file_deleted",
        }
    }

    /// Parse the stored text form
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "batch_submitted" => HistoryAction::BatchSubmitted,
            "job_completed" => HistoryAction::JobCompleted,
            "job_failed" => HistoryAction::JobFailed,
            "job_cancelled" => HistoryAction::JobCancelled,
            "job_retried" => HistoryAction::JobRetried,
            "series_archived" => HistoryAction::SeriesArchived,
            "file_deleted" => HistoryAction::FileDeleted,
            _ => return None,
        })
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// History log record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique history identifier
    pub id: i64,

    /// What happened
    pub action: HistoryAction,

    /// Free-form description (job name, failure reason, ...)
    pub details: String,

    /// Number of files the action concerned
    pub file_count: i64,

    /// When the entry was appended
    pub created_at: DateTime<Utc>,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A batch was added to the pending queue
    JobQueued {
        /// Job ID
        job_id: JobId,
        /// Number of files appended to the queue
        files: usize,
    },

    /// A worker slot picked up a file
    FileStarted {
        /// Owning job
        job_id: JobId,
        /// File ID
        file_id: FileId,
    },

    /// A file was fetched and staged
    FileCompleted {
        /// Owning job
        job_id: JobId,
        /// File ID
        file_id: FileId,
        /// Bytes written to the staging area
        size_bytes: u64,
    },

    /// A fetch failed
    FileFailed {
        /// Owning job
        job_id: JobId,
        /// File ID
        file_id: FileId,
        /// Error message
        error: String,
    },

    /// An in-flight fetch finished after its job was cancelled; result dropped
    FileDiscarded {
        /// Owning job
        job_id: JobId,
        /// File ID
        file_id: FileId,
    },

    /// Every file of the job is fetched; archive creation started
    JobArchiving {
        /// Job ID
        job_id: JobId,
    },

    /// Job archive created
    JobCompleted {
        /// Job ID
        job_id: JobId,
        /// The archive record created for it
        archive_id: ArchiveId,
    },

    /// Job archive step failed
    JobFailed {
        /// Job ID
        job_id: JobId,
        /// Error message
        error: String,
    },

    /// Job cancelled by the caller
    JobCancelled {
        /// Job ID
        job_id: JobId,
        /// Queue entries removed before they started
        removed: usize,
    },

    /// Series archive materialized
    SeriesArchived {
        /// Series key
        series: String,
        /// The archive record created for it
        archive_id: ArchiveId,
    },

    /// Downloader is shutting down
    Shutdown,
}
