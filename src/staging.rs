//! Staging area for fetched artifacts
//!
//! Every fetch attempt writes to its own `<unix-millis>_<name>` path inside the
//! staging directory, so concurrent attempts never share a destination. The
//! archiving step later resolves a file back to its most recent non-empty
//! staged copy.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::{debug, warn};

use crate::error::Result;

/// Last stamp handed out; stamps are strictly increasing within the process
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

fn next_stamp() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let stamp = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, stamp, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return stamp,
            Err(current) => last = current,
        }
    }
}

/// Fresh staging path for one fetch attempt of `name`
pub fn staged_path(staging_dir: &Path, name: &str) -> PathBuf {
    staging_dir.join(format!("{}_{}", next_stamp(), name))
}

/// Split a staged file name into its stamp and original name
fn split_stamp(file_name: &str) -> Option<(i64, &str)> {
    let (stamp, rest) = file_name.split_once('_')?;
    if stamp.is_empty() || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((stamp.parse().ok()?, rest))
}

/// Name a staged artifact should carry inside an archive (stamp removed)
pub fn entry_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match split_stamp(&file_name) {
        Some((_, original)) if !original.is_empty() => original.to_string(),
        _ => file_name,
    }
}

/// Resolve the staged artifact for `name`
///
/// Considers every staged file whose name contains `name` and is non-empty.
/// A copy whose stamp-stripped name equals `name` wins over a mere substring
/// match; among equals the most recent stamp wins. A missing staging
/// directory resolves to `None`.
pub async fn locate_artifact(staging_dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(staging_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut best: Option<((bool, i64), PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.contains(name) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() || metadata.len() == 0 {
            continue;
        }

        let (stamp, original) = split_stamp(&file_name).unwrap_or((0, file_name.as_str()));
        let rank = (original == name, stamp);
        if best.as_ref().is_none_or(|(best_rank, _)| rank > *best_rank) {
            best = Some((rank, entry.path()));
        }
    }

    Ok(best.map(|(_, path)| path))
}

/// Best-effort removal of a single staged artifact
pub async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "discarded staged artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to discard staged artifact"),
    }
}

/// Remove several staged artifacts concurrently
pub async fn remove_all(paths: &[PathBuf]) {
    futures::future::join_all(paths.iter().map(|p| discard(p))).await;
}
