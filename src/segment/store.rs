//! Segment Store
//!
//! Owns the active segment, the per-path handle cache and the read pool.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::{Config, SyncStrategy};
use crate::error::Result;
use crate::pool::{TaskHandle, TaskPool};
use crate::record::{current_timestamp, Record};

use super::{
    list_segments, parse_segment_timestamp, segment_file_name, segment_name, SegmentHandle,
};

/// Where an append landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResult {
    /// Segment the record was written to
    pub path: PathBuf,
    /// Absolute offset of the record's first value byte
    pub value_offset: u64,
}

/// The segment currently accepting appends
struct ActiveSegment {
    handle: Arc<SegmentHandle>,
    timestamp: u64,
    /// Bytes written so far (offset of the next frame)
    size: u64,
    /// Appends since the last fsync
    unsynced: usize,
}

/// Cached handles keyed by segment path
#[derive(Default)]
struct HandleCache {
    handles: RwLock<HashMap<PathBuf, Arc<SegmentHandle>>>,
}

impl HandleCache {
    /// Get the handle for `path`, opening it exactly once
    fn get_or_open(&self, path: &Path) -> Result<Arc<SegmentHandle>> {
        if let Some(handle) = self.handles.read().get(path) {
            return Ok(Arc::clone(handle));
        }

        let mut handles = self.handles.write();
        // Another reader may have opened it while we waited
        if let Some(handle) = handles.get(path) {
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(SegmentHandle::open(path)?);
        handles.insert(path.to_path_buf(), Arc::clone(&handle));
        tracing::debug!("Opened handle for {}", path.display());
        Ok(handle)
    }

    fn insert(&self, handle: Arc<SegmentHandle>) {
        self.handles
            .write()
            .insert(handle.path().to_path_buf(), handle);
    }

    fn remove(&self, path: &Path) -> Option<Arc<SegmentHandle>> {
        self.handles.write().remove(path)
    }

    fn len(&self) -> usize {
        self.handles.read().len()
    }
}

/// Manages the set of segment files
///
/// ## Concurrency:
/// - `active`: Mutex (single append path; rotation happens under it)
/// - `handles`: RwLock'd map, shared with pooled read tasks
/// - Reads never take the active lock
pub struct SegmentStore {
    /// Directory holding the segments
    dir: PathBuf,
    /// Rotation threshold (bytes)
    size_limit: u64,
    sync_strategy: SyncStrategy,
    active: Mutex<ActiveSegment>,
    handles: Arc<HandleCache>,
    /// Serves value reads
    readers: TaskPool,
}

impl SegmentStore {
    /// Open the store and start a fresh active segment
    ///
    /// On startup:
    /// 1. Create the directory if needed
    /// 2. Find the newest existing segment
    /// 3. Create a new active segment named after a later timestamp
    ///    (every earlier segment is now sealed)
    pub fn open(config: &Config) -> Result<Self> {
        let dir = config.storage_dir.clone();
        fs::create_dir_all(&dir)?;

        let newest = list_segments(&dir)?
            .last()
            .and_then(|path| parse_segment_timestamp(path));

        let timestamp = Self::next_timestamp(newest);
        let handle = Arc::new(SegmentHandle::create(&dir.join(segment_file_name(timestamp)))?);

        let handles = Arc::new(HandleCache::default());
        handles.insert(Arc::clone(&handle));

        tracing::info!("Active segment {}", handle.path().display());

        Ok(Self {
            dir,
            size_limit: config.segment_size_limit,
            sync_strategy: config.sync_strategy,
            active: Mutex::new(ActiveSegment {
                handle,
                timestamp,
                size: 0,
                unsynced: 0,
            }),
            handles,
            readers: TaskPool::new("bytevault-read", config.read_workers)?,
        })
    }

    /// Timestamps strictly increase even when rotations share a millisecond
    fn next_timestamp(previous: Option<u64>) -> u64 {
        let now = current_timestamp();
        match previous {
            Some(prev) if prev >= now => prev + 1,
            _ => now,
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a record to the active segment
    ///
    /// Rotates first if the active segment has already reached the size
    /// limit. The frame is written with one write call.
    pub fn append(&self, record: &Record) -> Result<AppendResult> {
        let mut active = self.active.lock();

        if active.size >= self.size_limit {
            self.rotate(&mut active)?;
        }

        let frame = record.encode_frame();
        if let Err(e) = active.handle.append(&frame) {
            self.discard_partial_append(&mut active);
            return Err(e);
        }

        let value_offset = active.size + record.value_offset_in_frame();
        active.size += frame.len() as u64;
        active.unsynced += 1;

        let should_sync = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => active.unsynced >= count,
        };
        if should_sync {
            active.handle.sync()?;
            active.unsynced = 0;
        }

        Ok(AppendResult {
            path: active.handle.path().to_path_buf(),
            value_offset,
        })
    }

    /// Drop whatever a failed append left past `active.size`
    ///
    /// Falls back to rotating if the file cannot be truncated, so the next
    /// append still lands at the offset it reports.
    fn discard_partial_append(&self, active: &mut ActiveSegment) {
        if let Err(e) = active.handle.truncate(active.size) {
            tracing::error!(
                "Could not truncate {} after a failed append: {}",
                active.handle.path().display(),
                e
            );
            if let Err(e) = self.rotate(active) {
                tracing::error!("Could not rotate away from a torn segment: {}", e);
            }
        }
    }

    /// Seal the active segment and open a new one (called with the active lock held)
    fn rotate(&self, active: &mut ActiveSegment) -> Result<()> {
        active.handle.sync()?;

        let timestamp = Self::next_timestamp(Some(active.timestamp));
        let handle = Arc::new(SegmentHandle::create(&self.dir.join(segment_file_name(timestamp)))?);
        self.handles.insert(Arc::clone(&handle));

        tracing::info!(
            "Sealed segment {} at {} bytes, active segment now {}",
            active.handle.path().display(),
            active.size,
            handle.path().display()
        );

        *active = ActiveSegment {
            handle,
            timestamp,
            size: 0,
            unsynced: 0,
        };
        Ok(())
    }

    /// fsync the active segment
    pub fn sync(&self) -> Result<()> {
        let mut active = self.active.lock();
        active.handle.sync()?;
        active.unsynced = 0;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read `length` bytes at `offset` of `segment` on the read pool
    ///
    /// `segment` is a file name inside the storage directory or a full path.
    /// Returns immediately; the caller blocks only in `TaskHandle::wait`.
    pub fn read(&self, segment: &Path, offset: u64, length: u32) -> TaskHandle<Bytes> {
        let handles = Arc::clone(&self.handles);
        let path = self.resolve(segment);
        self.readers.submit(move || {
            let handle = handles.get_or_open(&path)?;
            handle.read_at(offset, length)
        })
    }

    // =========================================================================
    // Segment Bookkeeping
    // =========================================================================

    /// Every segment (sealed and active), oldest first
    pub fn segments(&self) -> Result<Vec<PathBuf>> {
        list_segments(&self.dir)
    }

    /// Sealed segments only, oldest first
    pub fn sealed_segments(&self) -> Result<Vec<PathBuf>> {
        let active = self.active_path();
        let mut segments = self.segments()?;
        segments.retain(|path| *path != active);
        Ok(segments)
    }

    pub fn active_path(&self) -> PathBuf {
        self.active.lock().handle.path().to_path_buf()
    }

    /// Bytes written to the active segment
    pub fn active_size(&self) -> u64 {
        self.active.lock().size
    }

    /// Full path of a segment given by name or path
    fn resolve(&self, segment: &Path) -> PathBuf {
        self.dir.join(segment_name(segment))
    }

    /// Release the cached handle for `path` (no-op if none is cached)
    pub fn close_handle(&self, path: &Path) -> Result<()> {
        if let Some(handle) = self.handles.remove(&self.resolve(path)) {
            handle.close()?;
            tracing::debug!("Closed handle for {}", path.display());
        }
        Ok(())
    }

    /// Number of cached handles
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}
