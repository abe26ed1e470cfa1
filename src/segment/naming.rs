//! Segment file naming
//!
//! "segment_1700000000000" ↔ 1700000000000

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Prefix shared by every segment file
pub const SEGMENT_PREFIX: &str = "segment_";

/// Suffix of a compacted segment that has not been renamed into place yet
pub const COMPACTION_SUFFIX: &str = ".compact";

pub fn segment_file_name(timestamp: u64) -> String {
    format!("{}{}", SEGMENT_PREFIX, timestamp)
}

/// Parse the creation timestamp from a segment path
/// "segment_1700000000000" → Some(1700000000000)
pub fn parse_segment_timestamp(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(SEGMENT_PREFIX)?.parse().ok()
}

/// File name of a segment path (the path itself if it has none)
pub fn segment_name(path: &Path) -> PathBuf {
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf())
}

pub fn is_compaction_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(SEGMENT_PREFIX) && n.ends_with(COMPACTION_SUFFIX))
        .unwrap_or(false)
}

/// Temporary path used while compacting into `target`
pub fn compaction_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(COMPACTION_SUFFIX);
    target.with_file_name(name)
}

/// Every segment file in `dir`, oldest first
pub fn list_segments(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut segments: Vec<(u64, PathBuf)> = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(timestamp) = parse_segment_timestamp(&path) {
            segments.push((timestamp, path));
        }
    }

    segments.sort_by_key(|(timestamp, _)| *timestamp);
    Ok(segments.into_iter().map(|(_, path)| path).collect())
}
