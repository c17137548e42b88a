//! Archive creation for completed jobs and series.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ArchiveError, Error, Result};
use crate::staging;

/// Packs a list of local files into one compressed container
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Write `files` into a new archive at `output`, returning its compressed size
    ///
    /// Fails with [`Error::Io`] when an input cannot be read or the output
    /// cannot be created.
    async fn archive(&self, files: &[PathBuf], output: &Path) -> Result<u64>;
}

/// [`Archiver`] producing deflate-compressed ZIP files
///
/// Entries are named after the staged file with its stamp removed.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZipArchiver;

#[async_trait]
impl Archiver for ZipArchiver {
    async fn archive(&self, files: &[PathBuf], output: &Path) -> Result<u64> {
        let files = files.to_vec();
        let target = output.to_path_buf();

        let result = tokio::task::spawn_blocking(move || write_zip(&files, &target))
            .await
            .map_err(|e| ArchiveError::CreationFailed {
                path: output.to_path_buf(),
                reason: format!("archive task panicked: {}", e),
            })?;

        if result.is_err() {
            // Never leave a half-written archive behind
            if let Err(e) = tokio::fs::remove_file(output).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %output.display(), error = %e, "failed to remove partial archive");
            }
        }
        result
    }
}

fn zip_error(output: &Path, e: zip::result::ZipError) -> Error {
    match e {
        zip::result::ZipError::Io(io) => Error::Io(io),
        other => ArchiveError::CreationFailed {
            path: output.to_path_buf(),
            reason: other.to_string(),
        }
        .into(),
    }
}

fn write_zip(files: &[PathBuf], output: &Path) -> Result<u64> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(output)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .large_file(true);

    let mut seen = HashSet::new();
    for path in files {
        let name = staging::entry_name(path);
        if !seen.insert(name.clone()) {
            warn!(entry = %name, path = %path.display(), "duplicate archive entry skipped");
            continue;
        }

        let mut input = std::fs::File::open(path)?;
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| zip_error(output, e))?;
        std::io::copy(&mut input, &mut writer)?;
        debug!(entry = %name, "added archive entry");
    }

    let mut file = writer.finish().map_err(|e| zip_error(output, e))?;
    file.flush()?;
    Ok(file.metadata()?.len())
}
