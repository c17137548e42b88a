//! Test configuration helpers for creating downloaders rooted in a temp directory

use std::time::Duration;
use tempfile::TempDir;
use harvest_dl::config::{DownloadConfig, PersistenceConfig};
use harvest_dl::{Config, HarvestDownloader};

/// Build a config whose database, staging and archive directories live in `temp_dir`
pub fn create_test_config(temp_dir: &TempDir, capacity: usize) -> Config {
    Config {
        download: DownloadConfig {
            staging_dir: temp_dir.path().join("staging"),
            archive_dir: temp_dir.path().join("archives"),
            max_concurrent_downloads: capacity,
            fetch_timeout: Duration::from_secs(5),
            ..Default::default()
        },
        persistence: PersistenceConfig {
            database_path: temp_dir.path().join("test.db"),
        },
        shutdown_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Create a downloader with the HTTP fetcher and ZIP archiver
///
/// The returned `TempDir` must be kept alive for the duration of the test.
pub async fn create_test_downloader(
    capacity: usize,
) -> Result<(HarvestDownloader, TempDir), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let config = create_test_config(&temp_dir, capacity);
    let downloader = HarvestDownloader::new(config).await?;
    Ok((downloader, temp_dir))
}
