//! Remote document fetching.
//!
//! The orchestrator only sees the [`Fetcher`] trait; [`HttpFetcher`] is the
//! production implementation over `reqwest`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Error, Result};

/// Retrieves one remote resource into a local staging path
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` into `dest`, returning the number of bytes written
    ///
    /// `transferred` is bumped as bytes arrive and feeds throughput telemetry
    /// only. Any error (network failure, timeout, non-success status) means
    /// the attempt failed; no retry is expected from the implementation.
    async fn fetch(&self, url: &str, dest: &Path, transferred: &AtomicU64) -> Result<u64>;
}

/// [`Fetcher`] backed by a shared `reqwest` client
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    /// Build a fetcher using the configured timeout and user agent
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "Failed to create HTTP client: {}",
                    e
                )))
            })?;

        Ok(Self {
            client,
            timeout_secs: config.fetch_timeout.as_secs(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path, transferred: &AtomicU64) -> Result<u64> {
        url::Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::debug!(url, timeout_secs = self.timeout_secs, "fetch timed out");
            }
            Error::Network(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            transferred.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
        file.flush().await?;

        Ok(written)
    }
}
