//! Custom test assertions for E2E tests

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use harvest_dl::{ArchiveId, Event, HarvestDownloader, JobId};

/// Result of waiting for a job to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Job archived successfully
    Completed(ArchiveId),
    /// Archive step failed with error
    Failed(String),
    /// Timeout waiting for completion
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a job to reach a terminal archive outcome
///
/// Subscribe before submitting the job, otherwise the completion event may
/// already have been sent.
pub async fn wait_for_job(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    job_id: JobId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::JobCompleted {
                    job_id: id,
                    archive_id,
                }) if id == job_id => return WaitResult::Completed(archive_id),
                Ok(Event::JobFailed { job_id: id, error }) if id == job_id => {
                    return WaitResult::Failed(error);
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait until every file fetch has settled
pub async fn wait_until_idle(downloader: &HarvestDownloader, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async {
        while downloader.queue_len().await > 0 || downloader.active_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

/// Entry names of a ZIP archive on disk
pub fn zip_entry_names(archive: &Path) -> BTreeSet<String> {
    let file = std::fs::File::open(archive)
        .unwrap_or_else(|e| panic!("cannot open {}: {}", archive.display(), e));
    let mut zip = zip::ZipArchive::new(file)
        .unwrap_or_else(|e| panic!("{} is not a zip archive: {}", archive.display(), e));
    (0..zip.len())
        .map(|i| {
            zip.by_index(i)
                .unwrap_or_else(|e| panic!("bad entry {} in {}: {}", i, archive.display(), e))
                .name()
                .to_string()
        })
        .collect()
}

/// Read one entry of a ZIP archive fully
pub fn zip_entry_bytes(archive: &Path, name: &str) -> Vec<u8> {
    use std::io::Read;

    let file = std::fs::File::open(archive)
        .unwrap_or_else(|e| panic!("cannot open {}: {}", archive.display(), e));
    let mut zip = zip::ZipArchive::new(file)
        .unwrap_or_else(|e| panic!("{} is not a zip archive: {}", archive.display(), e));
    let mut entry = zip
        .by_name(name)
        .unwrap_or_else(|e| panic!("{} has no entry {}: {}", archive.display(), name, e));
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", name, e));
    bytes
}

/// Assert the archive contains exactly the given entry names
pub fn assert_zip_entries(archive: &Path, expected: &[&str]) {
    let actual = zip_entry_names(archive);
    let expected: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
    assert_eq!(
        actual,
        expected,
        "unexpected entries in {}",
        archive.display()
    );
}
