//! Engine Module
//!
//! The storage engine that coordinates the segment store and the index.
//!
//! ## Responsibilities
//! - Serve get/set/remove against the segment log
//! - Keep the index pointing at each key's latest value
//! - Clean up after an interrupted merge on startup
//! - Compaction (see `merge.rs`)

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Result, VaultError};
use crate::index::{
    ByteKey, DiskIndex, IndexTicket, KeyDir, KeyIndex, ValueLocation, INDEX_FILE_NAME,
    MAX_KEY_SIZE,
};
use crate::merge::{
    collect_live, remove_stale_compactions, repair_index, resume_interrupted_merge, MergeManifest,
    TailPolicy,
};
use crate::record::{is_tombstone, Record, MAX_RECORD_VALUE_SIZE};
use crate::segment::SegmentStore;

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes** (set/remove): appends serialize on the active segment's
///   mutex; the index update is queued and applied asynchronously.
///   The returned `IndexTicket` completes once it is visible to `get`.
///
/// - **Reads** (get): index lookup under a shared lock, value read on the
///   segment store's read pool. Reads never block each other.
///
/// - **Merge**: serialized by `merge_lock`. Takes `layout` exclusively
///   only while swapping segment files, so no read touches a file being
///   deleted.
///
/// Lock order: merge_lock → layout → (segment store / index internals)
pub struct Engine {
    config: Config,

    /// Segment files (active + sealed)
    pub(crate) segments: SegmentStore,

    /// Key → value location (disk B-tree or in-memory directory)
    pub(crate) index: Box<dyn KeyIndex>,

    /// Shared by get/set/remove, exclusive during merge's file swap
    pub(crate) layout: RwLock<()>,

    /// Serializes merges
    pub(crate) merge_lock: Mutex<()>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the storage directory
    /// 2. Finish a merge that committed its manifest, delete any other
    ///    compaction output
    /// 3. Open the segment store (starts a fresh active segment)
    /// 4. Open the disk index, or rebuild the key directory from segments
    /// 5. Point the index at a resumed merge's output, drop the manifest
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Storage directory
        fs::create_dir_all(&config.storage_dir)?;

        // Step 2: Compaction output without a manifest is never referenced
        let resumed = resume_interrupted_merge(&config.storage_dir)?;
        remove_stale_compactions(&config.storage_dir)?;

        // Step 3: Segments
        let segments = SegmentStore::open(&config)?;

        // Step 4: Index
        let index: Box<dyn KeyIndex> = if config.index_enabled {
            Box::new(Self::open_disk_index(&config, &segments)?)
        } else {
            Box::new(KeyDir::rebuild(&segments.sealed_segments()?)?)
        };

        // Step 5: Resumed merge
        if let Some(manifest) = resumed {
            repair_index(index.as_ref(), &config.storage_dir, &manifest)?;
            MergeManifest::clear(&config.storage_dir)?;
        }

        tracing::info!(
            "Engine opened at {} ({} segments, {} keys)",
            config.storage_dir.display(),
            segments.segments()?.len(),
            index.len()?
        );

        Ok(Self {
            config,
            segments,
            index,
            layout: RwLock::new(()),
            merge_lock: Mutex::new(()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified storage directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().storage_dir(path).build()?;
        Self::open(config)
    }

    /// Open `index.db`; a missing index next to existing segments is rebuilt
    fn open_disk_index(config: &Config, segments: &SegmentStore) -> Result<DiskIndex> {
        let path = config.storage_dir.join(INDEX_FILE_NAME);
        let existed = path.exists();
        let index = DiskIndex::open(&path, config.index_queue_capacity)?;

        if !existed {
            let sealed = segments.sealed_segments()?;
            if !sealed.is_empty() {
                let live = collect_live(&sealed, TailPolicy::Tolerate)?;
                tracing::warn!(
                    "Index file missing; rebuilding {} keys from {} segments",
                    live.len(),
                    sealed.len()
                );
                for (key, location) in live {
                    // Tickets are covered by the flush below
                    index.put(key, location)?;
                }
                index.flush()?;
            }
        }

        Ok(index)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Get the latest value for `key`
    ///
    /// Fails with `InvalidKey` if the key is not indexed. An index entry
    /// that turns out to point at a tombstone is dropped on the way out.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let key = ByteKey::from(key);
        let _layout = self.layout.read();

        let location = self
            .index
            .get(&key)?
            .ok_or_else(|| VaultError::InvalidKey(key.to_string()))?;

        let value = self
            .segments
            .read(&location.segment, location.value_offset, location.value_size)
            .wait()?;

        if is_tombstone(&value) {
            tracing::warn!("Index entry for {} points at a tombstone, removing it", key);
            self.index.delete(key.clone())?;
            return Err(VaultError::InvalidKey(key.to_string()));
        }

        Ok(value.to_vec())
    }

    /// Set `key` to `value`
    ///
    /// The record is durable in the log (per the sync strategy) when this
    /// returns; the index update completes with the returned ticket.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<IndexTicket> {
        if is_tombstone(value) {
            return Err(VaultError::ReservedValue);
        }
        check_sizes(key.len(), value.len())?;

        let _layout = self.layout.read();

        let record = Record::new(key.to_vec(), value.to_vec());
        let appended = self.segments.append(&record)?;
        let location = ValueLocation::new(
            appended.path,
            appended.value_offset,
            record.value_size(),
            record.timestamp,
        );

        self.index.put(ByteKey::from(record.key), location)
    }

    /// Remove `key`
    ///
    /// Fails with `InvalidKey` if the key is not currently indexed.
    /// Otherwise a tombstone is appended and the index entry dropped.
    pub fn remove(&self, key: &[u8]) -> Result<IndexTicket> {
        let key = ByteKey::from(key);
        let _layout = self.layout.read();

        if self.index.get(&key)?.is_none() {
            return Err(VaultError::InvalidKey(key.to_string()));
        }

        self.segments.append(&Record::tombstone(key.to_bytes()))?;
        self.index.delete(key)
    }

    /// Block until every queued index update has been applied
    pub fn sync_index(&self) -> Result<()> {
        self.index.flush()
    }

    /// Flush the index and fsync the active segment
    pub fn close(self) -> Result<()> {
        self.index.flush()?;
        self.segments.sync()?;
        tracing::info!("Engine closed at {}", self.config.storage_dir.display());
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage_dir(&self) -> &Path {
        &self.config.storage_dir
    }

    /// Segment currently accepting appends
    pub fn active_segment(&self) -> PathBuf {
        self.segments.active_path()
    }

    /// Every segment, oldest first (the active one is last)
    pub fn segments(&self) -> Result<Vec<PathBuf>> {
        self.segments.segments()
    }

    pub fn segment_count(&self) -> Result<usize> {
        Ok(self.segments.segments()?.len())
    }

    /// Number of keys in the index (applied updates only)
    pub fn key_count(&self) -> Result<usize> {
        self.index.len()
    }
}

/// Keys must fit an index node and the frame length must fit its prefix
fn check_sizes(key_len: usize, value_len: usize) -> Result<()> {
    if key_len > MAX_KEY_SIZE {
        return Err(VaultError::KeyTooLarge {
            size: key_len,
            max: MAX_KEY_SIZE,
        });
    }
    if value_len > MAX_RECORD_VALUE_SIZE {
        return Err(VaultError::ValueTooLarge {
            size: value_len,
            max: MAX_RECORD_VALUE_SIZE,
        });
    }
    Ok(())
}
