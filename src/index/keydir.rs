//! In-memory key directory
//!
//! Used when the on-disk index is disabled. Rebuilt from the segments on
//! every open, the classic Bitcask way.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::error::Result;
use crate::merge::{collect_live, TailPolicy};
use crate::pool::TaskHandle;

use super::{ByteKey, IndexTicket, KeyIndex, ValueLocation};

/// Hash map of key → location; mutations apply synchronously
#[derive(Default)]
pub struct KeyDir {
    entries: RwLock<HashMap<ByteKey, ValueLocation>>,
}

impl KeyDir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `segments` (oldest first) into a fresh directory
    ///
    /// A torn final frame (crash mid-append) ends that segment's replay.
    pub fn rebuild(segments: &[PathBuf]) -> Result<Self> {
        let live = collect_live(segments, TailPolicy::Tolerate)?;
        tracing::info!(
            "Rebuilt key directory: {} live keys from {} segments",
            live.len(),
            segments.len()
        );
        Ok(Self {
            entries: RwLock::new(live.into_iter().collect()),
        })
    }
}

impl KeyIndex for KeyDir {
    fn get(&self, key: &ByteKey) -> Result<Option<ValueLocation>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: ByteKey, location: ValueLocation) -> Result<IndexTicket> {
        self.entries.write().insert(key, location);
        Ok(TaskHandle::ready(Ok(())))
    }

    fn delete(&self, key: ByteKey) -> Result<IndexTicket> {
        self.entries.write().remove(&key);
        Ok(TaskHandle::ready(Ok(())))
    }

    fn replace_if(
        &self,
        key: ByteKey,
        expected: ValueLocation,
        location: ValueLocation,
    ) -> Result<IndexTicket> {
        let mut entries = self.entries.write();
        if let Some(current) = entries.get_mut(&key) {
            if current.points_to_same_value(&expected) {
                *current = location;
            }
        }
        Ok(TaskHandle::ready(Ok(())))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }
}
