//! Shared test helpers for creating HarvestDownloader instances in tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{TempDir, tempdir};
use tokio::sync::Semaphore;

use crate::archiver::{Archiver, ZipArchiver};
use crate::config::Config;
use crate::db::{Database, FileRecord, NewFile};
use crate::downloader::HarvestDownloader;
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::types::{FileId, FileStatus, JobId, JobStatus};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_STEP: Duration = Duration::from_millis(10);

/// URL the helpers give a file called `name`
pub(crate) fn url_for(name: &str) -> String {
    format!("https://docs.example/files/{}", name)
}

#[derive(Clone)]
enum Outcome {
    Body(Vec<u8>),
    Fail(String),
}

/// Scripted in-memory [`Fetcher`]
///
/// Every URL succeeds with a small body unless scripted otherwise. A held URL
/// blocks inside `fetch` until released, after its bytes have been counted,
/// so tests can observe in-flight state. The outcome is read after the gate,
/// so it may be changed while a fetch is held.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    outcomes: Mutex<HashMap<String, Outcome>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    started: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub(crate) fn fail(&self, name: &str, message: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(url_for(name), Outcome::Fail(message.to_string()));
    }

    pub(crate) fn succeed_with(&self, name: &str, body: &[u8]) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(url_for(name), Outcome::Body(body.to_vec()));
    }

    /// Make fetches of `name` block until [`release`](Self::release)
    pub(crate) fn hold(&self, name: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(url_for(name), Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release(&self, name: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(&url_for(name)) {
            gate.add_permits(1);
        }
    }

    /// Names fetched so far, in start order
    pub(crate) fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|url| url.rsplit('/').next().unwrap().to_string())
            .collect()
    }

    pub(crate) fn started_count(&self, name: &str) -> usize {
        self.started().iter().filter(|n| *n == name).count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn outcome(&self, url: &str) -> Outcome {
        self.outcomes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Outcome::Body(format!("contents of {}", url).into_bytes()))
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path, transferred: &AtomicU64) -> Result<u64> {
        self.started.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Outcome::Body(body) = self.outcome(url) {
            transferred.fetch_add(body.len() as u64, Ordering::Relaxed);
        }

        let gate = self.gates.lock().unwrap().get(url).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let result = match self.outcome(url) {
            Outcome::Body(body) => {
                tokio::fs::write(dest, &body).await?;
                Ok(body.len() as u64)
            }
            Outcome::Fail(message) => Err(Error::Io(std::io::Error::other(message))),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// [`ZipArchiver`] that counts its invocations
#[derive(Default)]
pub(crate) struct CountingArchiver {
    pub(crate) calls: AtomicUsize,
}

#[async_trait]
impl Archiver for CountingArchiver {
    async fn archive(&self, files: &[PathBuf], output: &Path) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ZipArchiver.archive(files, output).await
    }
}

/// [`Archiver`] that always fails
pub(crate) struct FailingArchiver;

#[async_trait]
impl Archiver for FailingArchiver {
    async fn archive(&self, _files: &[PathBuf], _output: &Path) -> Result<u64> {
        Err(Error::Io(std::io::Error::other("disk full")))
    }
}

/// A downloader wired to a [`FakeFetcher`], plus the tempdir it lives in
pub(crate) struct TestHarness {
    pub(crate) downloader: HarvestDownloader,
    pub(crate) fetcher: Arc<FakeFetcher>,
    pub(crate) dir: TempDir,
}

/// Config rooted in `dir` with the given worker capacity
pub(crate) fn test_config(dir: &Path, capacity: usize) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.download.staging_dir = dir.join("staging");
    config.download.archive_dir = dir.join("archives");
    config.download.max_concurrent_downloads = capacity;
    config.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Helper to create a test downloader with the ZIP archiver
pub(crate) async fn create_test_downloader(capacity: usize) -> TestHarness {
    create_test_downloader_with(capacity, |_| {}, Arc::new(ZipArchiver)).await
}

/// Helper to create a test downloader with a tweaked config and archiver
pub(crate) async fn create_test_downloader_with(
    capacity: usize,
    tweak: impl FnOnce(&mut Config),
    archiver: Arc<dyn Archiver>,
) -> TestHarness {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), capacity);
    tweak(&mut config);

    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();
    let fetcher = Arc::new(FakeFetcher::default());
    let downloader = HarvestDownloader::with_components(config, db, fetcher.clone(), archiver)
        .await
        .unwrap();

    TestHarness {
        downloader,
        fetcher,
        dir,
    }
}

/// Record one file per name, served by the fake fetcher
pub(crate) async fn add_named_files(
    downloader: &HarvestDownloader,
    names: &[&str],
) -> Vec<FileRecord> {
    let files = names
        .iter()
        .map(|name| NewFile {
            url: url_for(name),
            name: name.to_string(),
            size: None,
        })
        .collect();
    downloader.add_files(files).await.unwrap()
}

/// Create a job named `name` over `files` and submit it
pub(crate) async fn submit_job(
    downloader: &HarvestDownloader,
    name: &str,
    files: &[FileRecord],
) -> JobId {
    let job = downloader.create_job(name, files.len()).await.unwrap();
    downloader.submit_batch(job.id, files.to_vec()).await.unwrap();
    job.id
}

pub(crate) async fn file_status(downloader: &HarvestDownloader, id: FileId) -> FileStatus {
    downloader.db.get_file(id).await.unwrap().unwrap().status
}

pub(crate) async fn job_status(downloader: &HarvestDownloader, id: JobId) -> JobStatus {
    downloader.db.get_job(id).await.unwrap().unwrap().status
}

pub(crate) async fn wait_for_file_status(
    downloader: &HarvestDownloader,
    id: FileId,
    expected: FileStatus,
) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while file_status(downloader, id).await != expected {
            tokio::time::sleep(WAIT_STEP).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("file {} never reached {}", id, expected));
}

pub(crate) async fn wait_for_job_status(
    downloader: &HarvestDownloader,
    id: JobId,
    expected: JobStatus,
) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while job_status(downloader, id).await != expected {
            tokio::time::sleep(WAIT_STEP).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {} never reached {}", id, expected));
}

/// Wait until the fake fetcher has started at least `count` fetches
pub(crate) async fn wait_for_started(fetcher: &FakeFetcher, count: usize) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while fetcher.started().len() < count {
            tokio::time::sleep(WAIT_STEP).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("fewer than {} fetches started", count));
}

/// Wait until nothing is queued or in flight
pub(crate) async fn wait_until_idle(downloader: &HarvestDownloader) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while downloader.queue_len().await > 0 || downloader.active_count().await > 0 {
            tokio::time::sleep(WAIT_STEP).await;
        }
    })
    .await
    .expect("downloader never became idle");
}

/// Wait until the job's downloaded counter reaches `count`
pub(crate) async fn wait_for_downloaded(downloader: &HarvestDownloader, id: JobId, count: i64) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while downloader.db.get_job(id).await.unwrap().unwrap().downloaded_files != count {
            tokio::time::sleep(WAIT_STEP).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {} never counted {} files", id, count));
}
