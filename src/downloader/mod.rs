//! Core downloader implementation split into focused submodules.
//!
//! The `HarvestDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Batch submission and admission-controlled queue draining
//! - [`fetch_task`] - Per-file fetch lifecycle
//! - [`completion`] - Job completion detection and archive handoff
//! - [`series`] - Range and series job construction, series archives
//! - [`control`] - File/job records, cancellation, retry, deletion
//! - [`telemetry`] - Throughput estimation over in-flight fetches
//! - [`lifecycle`] - Startup recovery and shutdown coordination

mod completion;
mod control;
mod fetch_task;
mod lifecycle;
mod queue;
mod series;
mod telemetry;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio_util::sync::CancellationToken;

use crate::archiver::{Archiver, ZipArchiver};
use crate::config::Config;
use crate::db::{Database, FileRecord};
use crate::error::{Error, Result};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::types::{Event, FileId, JobId};

use telemetry::ActiveDownload;

/// Pending (job, file) pair waiting for a worker slot
#[derive(Debug, Clone)]
pub(crate) struct QueueEntry {
    pub(crate) job_id: JobId,
    pub(crate) file: FileRecord,
    /// Cancellation token of the job generation that enqueued this entry
    pub(crate) token: CancellationToken,
}

/// Queue, worker count and job cancellation tokens
///
/// Always accessed through [`QueueState::scheduler`], the single
/// serialization point for admission decisions. Job status changes made by
/// submission, cancellation, retry and the archive handoff, and the
/// completed-file counter, are also only written while it is held.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    /// FIFO across all jobs
    pub(crate) pending: VecDeque<QueueEntry>,
    /// Fetches currently holding a worker slot
    pub(crate) active: usize,
    /// Live cancellation token per job
    pub(crate) job_tokens: HashMap<JobId, CancellationToken>,
}

impl Scheduler {
    /// Token for the job's current generation, replacing a cancelled one
    pub(crate) fn token_for(&mut self, job_id: JobId) -> CancellationToken {
        let token = self
            .job_tokens
            .entry(job_id)
            .or_insert_with(CancellationToken::new);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }
}

/// Queue and fetch state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Pending queue, active count and job tokens (protected by Mutex)
    pub(crate) scheduler: Arc<tokio::sync::Mutex<Scheduler>>,
    /// In-flight fetches keyed by file, for throughput telemetry
    pub(crate) active_downloads: Arc<tokio::sync::Mutex<HashMap<FileId, ActiveDownload>>>,
    /// Flag to indicate whether new batches are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            scheduler: Arc::new(tokio::sync::Mutex::new(Scheduler::default())),
            active_downloads: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Download job orchestrator (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct HarvestDownloader {
    /// Record store (public for callers and integration tests to inspect state)
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Retrieves remote documents into the staging area
    pub(crate) fetcher: Arc<dyn Fetcher>,
    /// Packs staged artifacts into archives
    pub(crate) archiver: Arc<dyn Archiver>,
    /// Queue and fetch state management
    pub(crate) queue_state: QueueState,
}

impl HarvestDownloader {
    /// Create a new downloader with the HTTP fetcher and ZIP archiver
    ///
    /// Opens (or creates) the SQLite database at the configured path and runs
    /// startup recovery before returning.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let db = Database::new(&config.persistence.database_path).await?;
        let fetcher = Arc::new(HttpFetcher::new(&config.download)?);
        Self::with_components(config, db, fetcher, Arc::new(ZipArchiver)).await
    }

    /// Create a downloader from explicitly supplied collaborators
    ///
    /// Creates the staging and archive directories, then resets state left
    /// behind by an interrupted previous process.
    pub async fn with_components(
        config: Config,
        db: Database,
        fetcher: Arc<dyn Fetcher>,
        archiver: Arc<dyn Archiver>,
    ) -> Result<Self> {
        config.validate()?;

        for dir in [&config.download.staging_dir, &config.download.archive_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                ))
            })?;
        }

        // Buffer of 1000 events per subscriber before lagging
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let downloader = Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            fetcher,
            archiver,
            queue_state: QueueState::new(),
        };

        downloader.recover_interrupted().await?;

        Ok(downloader)
    }

    /// Subscribe to job and file events
    ///
    /// Each subscriber receives every event independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use harvest_dl::{Config, Event, HarvestDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = HarvestDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             if let Event::JobCompleted { job_id, .. } = event {
    ///                 println!("job {} archived", job_id);
    ///             }
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// Dropped silently when nobody is subscribed.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
