//! Series grouping and job-name parsing
//!
//! Filename conventions are the only link between a discovered file and the
//! job or archive it belongs to. A job's display name encodes which files it
//! covers, either a numeric window (`"12-40"`) over the files' leading numbers
//! or a series key (`"Series 004"`) taken from a fixed-width numeric prefix.
//! Everything here is pure.

use std::collections::BTreeMap;

use crate::config::GroupingConfig;

const SERIES_PREFIX: &str = "Series ";

/// What a job display name selects
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobSelector {
    /// Files whose leading number lies in `start..=end`
    Range {
        /// First number of the window
        start: u64,
        /// Last number of the window (inclusive)
        end: u64,
    },
    /// Files whose series key equals the given key
    Series(String),
    /// The name encodes neither form
    Unparseable,
}

impl JobSelector {
    /// Whether `filename` belongs to this selection
    pub fn matches(&self, filename: &str, grouping: &GroupingConfig) -> bool {
        match self {
            JobSelector::Range { start, end } => {
                leading_number(filename).is_some_and(|n| (*start..=*end).contains(&n))
            }
            JobSelector::Series(key) => group_key(filename, grouping) == key.as_str(),
            JobSelector::Unparseable => false,
        }
    }

    /// The display name this selection is encoded as
    pub fn job_name(&self) -> Option<String> {
        match self {
            JobSelector::Range { start, end } => Some(range_job_name(*start, *end)),
            JobSelector::Series(key) => Some(series_job_name(key)),
            JobSelector::Unparseable => None,
        }
    }
}

/// Extract the fixed-width numeric series key of a filename
///
/// Returns `None` when the first `width` characters are not all ASCII digits.
pub fn series_key(filename: &str, width: usize) -> Option<&str> {
    let prefix = filename.as_bytes().get(..width)?;
    if width > 0 && prefix.iter().all(u8::is_ascii_digit) {
        // ASCII digits are single bytes, so `width` is a char boundary
        Some(&filename[..width])
    } else {
        None
    }
}

/// Series key of a filename, or the configured default group
pub fn group_key<'a>(filename: &'a str, grouping: &'a GroupingConfig) -> &'a str {
    series_key(filename, grouping.series_prefix_width).unwrap_or(&grouping.default_group)
}

/// Integer value of the filename's leading digit run
pub fn leading_number(filename: &str) -> Option<u64> {
    let digits = filename.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    filename[..digits].parse().ok()
}

/// Display name of a range job
pub fn range_job_name(start: u64, end: u64) -> String {
    format!("{}-{}", start, end)
}

/// Display name of a series job
pub fn series_job_name(key: &str) -> String {
    format!("{}{}", SERIES_PREFIX, key)
}

/// Parse a job display name into the selection it encodes
///
/// `"Series <key>"` yields a series; otherwise the last whitespace-separated
/// token is tried as `<start>-<end>` with `start <= end`, so labels such as
/// `"Files 1-20"` also parse.
pub fn parse_job_name(name: &str) -> JobSelector {
    let name = name.trim();

    if let Some(key) = name.strip_prefix(SERIES_PREFIX) {
        let key = key.trim();
        return if key.is_empty() {
            JobSelector::Unparseable
        } else {
            JobSelector::Series(key.to_string())
        };
    }

    let Some(token) = name.split_whitespace().last() else {
        return JobSelector::Unparseable;
    };
    let Some((start, end)) = token.split_once('-') else {
        return JobSelector::Unparseable;
    };
    if !is_all_digits(start) || !is_all_digits(end) {
        return JobSelector::Unparseable;
    }
    match (start.parse::<u64>(), end.parse::<u64>()) {
        (Ok(start), Ok(end)) if start <= end => JobSelector::Range { start, end },
        _ => JobSelector::Unparseable,
    }
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Partition items into series groups, keyed and ordered by series key
///
/// Items keep their relative order inside each group.
pub fn partition_by_series<T, F>(
    items: impl IntoIterator<Item = T>,
    grouping: &GroupingConfig,
    name_of: F,
) -> BTreeMap<String, Vec<T>>
where
    F: Fn(&T) -> &str,
{
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        let key = group_key(name_of(&item), grouping).to_string();
        groups.entry(key).or_default().push(item);
    }
    groups
}
