//! # harvest-dl
//!
//! Backend library that harvests remote documents in batches and packs each
//! finished batch into a ZIP archive.
//!
//! ## Design Philosophy
//!
//! harvest-dl is designed to be:
//! - **Bounded** - A fixed worker capacity caps fetches in flight across all jobs
//! - **Durable** - Files, jobs, archives and history live in SQLite and survive restarts
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! Files are grouped into jobs either by a numeric range over their leading
//! number (`"1-20"`) or by a fixed-width series prefix (`"Series 004"`). A job
//! is archived exactly once, when its last file is fetched.
//!
//! ## Quick Start
//!
//! ```no_run
//! use harvest_dl::{Config, Event, HarvestDownloader, NewFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.max_concurrent_downloads = 4;
//!
//!     let downloader = HarvestDownloader::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     downloader
//!         .add_files(vec![
//!             NewFile::from_url("https://example.com/minutes/001_january.pdf")?,
//!             NewFile::from_url("https://example.com/minutes/002_february.pdf")?,
//!         ])
//!         .await?;
//!     let job = downloader.submit_range(1, 2).await?;
//!     println!("submitted job {}", job.name);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive creation
pub mod archiver;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Remote document retrieval
pub mod fetcher;
/// Series grouping and job-name parsing
pub mod grouping;
/// Staging area layout
pub mod staging;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archiver::{Archiver, ZipArchiver};
pub use config::{Config, DownloadConfig, GroupingConfig, PersistenceConfig};
pub use db::{ArchiveRecord, Database, FileRecord, JobRecord, NewFile};
pub use downloader::HarvestDownloader;
pub use error::{ArchiveError, DatabaseError, DownloadError, Error, Result};
pub use fetcher::{Fetcher, HttpFetcher};
pub use grouping::JobSelector;
pub use types::{
    ArchiveId, Event, FileId, FileStatus, HistoryAction, HistoryEntry, JobId, JobStatus,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use harvest_dl::{HarvestDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = HarvestDownloader::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: HarvestDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
