//! Point-in-time throughput estimate over in-flight fetches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::types::{FileId, JobId};
use crate::utils::format_speed;

use super::HarvestDownloader;

/// Transfers younger than this have no meaningful rate yet
const MIN_MEASURABLE_ELAPSED: Duration = Duration::from_millis(1);

/// Tracking record for one in-flight fetch
#[derive(Debug, Clone)]
pub(crate) struct ActiveDownload {
    pub(crate) job_id: JobId,
    pub(crate) transferred: Arc<AtomicU64>,
    pub(crate) started: Instant,
}

/// Mean of per-transfer rates in bytes per second
///
/// Each sample is `(bytes transferred, elapsed)`. Samples with less than a
/// millisecond elapsed are skipped; `None` when nothing is measurable.
pub(crate) fn aggregate_rate(samples: impl IntoIterator<Item = (u64, Duration)>) -> Option<f64> {
    let rates: Vec<f64> = samples
        .into_iter()
        .filter(|(_, elapsed)| *elapsed >= MIN_MEASURABLE_ELAPSED)
        .map(|(bytes, elapsed)| bytes as f64 / elapsed.as_secs_f64())
        .collect();

    if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }
}

impl HarvestDownloader {
    /// Current aggregate download speed, e.g. `"1.5 MB/s"`
    ///
    /// Computed only from fetches in flight at the moment of the call, with
    /// no smoothing across calls; reads `"0 KB/s"` when none are measurable.
    pub async fn current_throughput(&self) -> String {
        let now = Instant::now();
        let active = self.queue_state.active_downloads.lock().await;
        let rate = aggregate_rate(active.values().map(|download| {
            (
                download.transferred.load(Ordering::Relaxed),
                now.saturating_duration_since(download.started),
            )
        }));
        format_speed(rate.unwrap_or(0.0))
    }

    /// Number of in-flight fetches per job
    pub async fn active_fetches_for(&self, job_id: JobId) -> usize {
        self.queue_state
            .active_downloads
            .lock()
            .await
            .values()
            .filter(|download| download.job_id == job_id)
            .count()
    }

    pub(crate) async fn track_start(&self, job_id: JobId, file_id: FileId) -> Arc<AtomicU64> {
        let transferred = Arc::new(AtomicU64::new(0));
        self.queue_state.active_downloads.lock().await.insert(
            file_id,
            ActiveDownload {
                job_id,
                transferred: Arc::clone(&transferred),
                started: Instant::now(),
            },
        );
        transferred
    }

    pub(crate) async fn track_finish(&self, file_id: FileId) {
        self.queue_state
            .active_downloads
            .lock()
            .await
            .remove(&file_id);
    }
}
