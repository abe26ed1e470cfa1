//! Value locations
//!
//! Where a value's bytes live, independent of its key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::segment::segment_name;

/// Segment file name + offset + length of a stored value
///
/// Only the file name is kept, so `index.db` stays valid whatever the
/// storage directory is called or however it was spelled in the config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueLocation {
    /// File name of the segment holding the value
    pub segment: PathBuf,
    /// Absolute byte offset of the first value byte
    pub value_offset: u64,
    /// Value length in bytes
    pub value_size: u32,
    /// Timestamp of the record that wrote the value
    pub timestamp: u64,
}

impl ValueLocation {
    /// Accepts a full segment path or a bare file name
    pub fn new(segment: impl AsRef<Path>, value_offset: u64, value_size: u32, timestamp: u64) -> Self {
        Self {
            segment: segment_name(segment.as_ref()),
            value_offset,
            value_size,
            timestamp,
        }
    }

    /// Same bytes on disk (segment and offset match)
    pub fn points_to_same_value(&self, other: &ValueLocation) -> bool {
        self.value_offset == other.value_offset && self.segment == other.segment
    }

    /// Full path of the segment inside `dir`
    pub fn resolve(&self, dir: &Path) -> PathBuf {
        dir.join(&self.segment)
    }
}
