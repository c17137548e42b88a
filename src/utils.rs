//! Formatting and naming helpers

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Format a byte count as a human-readable size using base-1024 units
///
/// # Examples
///
/// ```
/// use harvest_dl::utils::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    let value = bytes as f64;
    if value < KB {
        format!("{} B", bytes)
    } else if value < MB {
        format!("{:.2} KB", value / KB)
    } else if value < GB {
        format!("{:.2} MB", value / MB)
    } else {
        format!("{:.2} GB", value / GB)
    }
}

/// Format a transfer rate in bytes per second
///
/// Below 1024 B/s the rate is shown in B/s, below 1024² in KB/s, otherwise
/// in MB/s. Non-finite or non-positive rates read as `"0 KB/s"`.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "0 KB/s".to_string();
    }
    if bytes_per_sec < KB {
        format!("{:.0} B/s", bytes_per_sec)
    } else if bytes_per_sec < MB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else {
        format!("{:.2} MB/s", bytes_per_sec / MB)
    }
}

/// Turn a display name into a safe archive filename (without extension)
///
/// Path separators and characters rejected by common filesystems become `_`;
/// surrounding whitespace and dots are stripped. An empty result becomes
/// `"archive"`.
pub fn sanitize_archive_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.');

    if cleaned.is_empty() {
        "archive".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Derive a file name from the last non-empty path segment of a URL
///
/// Percent-encoded segments are returned as they appear in the URL.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    Some(segment.to_string())
}
