//! Configuration types for harvest-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Download behavior configuration (directories, concurrency, fetch limits)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory receiving one staged artifact per fetch attempt (default: "./staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Directory receiving finished archives (default: "./archives")
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Worker capacity: maximum fetches in flight at once (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Per-request timeout for a single fetch (default: 60 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// User-Agent header sent with every fetch
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Delete staged artifacts once they have been archived (default: false)
    #[serde(default)]
    pub remove_staged_after_archive: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            archive_dir: default_archive_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            fetch_timeout: default_fetch_timeout(),
            user_agent: default_user_agent(),
            remove_staged_after_archive: false,
        }
    }
}

/// Filename-based series grouping
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupingConfig {
    /// Width of the leading numeric prefix that forms a series key (default: 3)
    #[serde(default = "default_series_prefix_width")]
    pub series_prefix_width: usize,

    /// Group used for filenames without a numeric prefix (default: "misc")
    #[serde(default = "default_group")]
    pub default_group: String,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            series_prefix_width: default_series_prefix_width(),
            default_group: default_group(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./harvest-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`HarvestDownloader`](crate::HarvestDownloader)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Series grouping settings
    #[serde(default)]
    pub grouping: GroupingConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// How long `shutdown()` waits for in-flight fetches (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            grouping: GroupingConfig::default(),
            persistence: PersistenceConfig::default(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Config {
    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "worker capacity must be at least 1".to_string(),
                key: Some("max_concurrent_downloads".to_string()),
            });
        }
        if self.grouping.series_prefix_width == 0 {
            return Err(Error::Config {
                message: "series prefix width must be at least 1".to_string(),
                key: Some("series_prefix_width".to_string()),
            });
        }
        if self.grouping.default_group.trim().is_empty() {
            return Err(Error::Config {
                message: "default group must not be empty".to_string(),
                key: Some("default_group".to_string()),
            });
        }
        Ok(())
    }

    /// Load a JSON config file; missing fields take their defaults
    ///
    /// The loaded config is validated before it is returned.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./staging")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("./archives")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    format!("harvest-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_series_prefix_width() -> usize {
    3
}

fn default_group() -> String {
    "misc".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./harvest-dl.db")
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
