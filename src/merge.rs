//! Merge Module
//!
//! Compacts every sealed segment into one, dropping superseded and deleted
//! values.
//!
//! ## Merge Process
//! ```text
//! sealed: [seg_100] [seg_200] [seg_300]      active: [seg_400]
//!              │        │         │
//!              └────────┼─────────┘   scan oldest → newest, last write wins
//!                       ▼
//!              seg_300.compact               (live values, key order)
//!                       │
//!                       ▼   relocate index, delete seg_100 + seg_200
//!              [seg_300]                     active: [seg_400]
//! ```
//!
//! The active segment is never touched, so writes continue during a merge.
//! Index relocation is conditional: a key written again while the merge
//! was running keeps its newer location.
//!
//! ## Crash Recovery
//! Once the compacted file is synced, `merge.manifest` records the merged
//! segments and the target. From then on the merge only moves forward: an
//! open that finds the manifest finishes the deletes and the rename, points
//! the index at the compacted copies and removes the manifest. A `.compact`
//! file without a manifest is an unfinished copy and is deleted.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{Result, VaultError};
use crate::index::{ByteKey, KeyIndex, ValueLocation};
use crate::record::{Record, RecordIterator};
use crate::segment::{compaction_path, segment_name, SegmentWriter};

/// Name of the file marking a merge whose output is complete
pub const MERGE_MANIFEST_FILE_NAME: &str = "merge.manifest";

/// How a scan treats a segment whose tail cannot be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TailPolicy {
    /// Fail the scan with `MalformedRecord`
    Strict,
    /// Log it and ignore the rest of that segment (torn final append)
    Tolerate,
}

/// Outcome of one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Sealed segments folded into the compacted one (0 for a no-op)
    pub segments_merged: usize,
    /// Records written to the compacted segment
    pub live_keys: usize,
    /// Total size of the merged segments
    pub bytes_before: u64,
    /// Size of the compacted segment
    pub bytes_after: u64,
}

/// Replay `segments` (oldest first) into key → latest value location
///
/// A tombstone removes whatever an earlier record set for its key.
pub(crate) fn collect_live(
    segments: &[PathBuf],
    policy: TailPolicy,
) -> Result<BTreeMap<ByteKey, ValueLocation>> {
    let mut live = BTreeMap::new();

    for path in segments {
        for scanned in RecordIterator::open(path)? {
            let scanned = match scanned {
                Ok(scanned) => scanned,
                Err(e @ VaultError::MalformedRecord(_)) if policy == TailPolicy::Tolerate => {
                    tracing::warn!("Ignoring unreadable tail: {}", e);
                    break;
                }
                Err(e) => return Err(e),
            };

            let record = scanned.record;
            let key = ByteKey::from(record.key.clone());
            if record.is_tombstone() {
                live.remove(&key);
            } else {
                let location = ValueLocation::new(
                    path.clone(),
                    scanned.value_offset,
                    record.value_size(),
                    record.timestamp,
                );
                live.insert(key, location);
            }
        }
    }

    Ok(live)
}

fn total_size(paths: &[PathBuf]) -> Result<u64> {
    let mut total = 0;
    for path in paths {
        total += fs::metadata(path).map_err(VaultError::segment_io(path))?.len();
    }
    Ok(total)
}

/// What an interrupted merge still has to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MergeManifest {
    /// File name of the segment the compacted file replaces
    pub target: PathBuf,
    /// File names of every merged segment, oldest first (target included)
    pub candidates: Vec<PathBuf>,
}

impl MergeManifest {
    pub fn new(target: &Path, candidates: &[PathBuf]) -> Self {
        Self {
            target: segment_name(target),
            candidates: candidates.iter().map(|path| segment_name(path)).collect(),
        }
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MERGE_MANIFEST_FILE_NAME)
    }

    fn temp_path(dir: &Path) -> PathBuf {
        dir.join(format!("{}.tmp", MERGE_MANIFEST_FILE_NAME))
    }

    /// Write the manifest durably (temp file, fsync, rename)
    pub fn write(&self, dir: &Path) -> Result<()> {
        let temp = Self::temp_path(dir);
        let bytes = bincode::serialize(self)?;

        let mut file = File::create(&temp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, Self::path(dir))?;
        sync_dir(dir)
    }

    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(dir);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(bincode::deserialize(&bytes)?))
    }

    pub fn clear(dir: &Path) -> Result<()> {
        fs::remove_file(Self::path(dir))?;
        sync_dir(dir)
    }
}

/// Make renames and deletes in `dir` durable
fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Finish the file swap of a merge that wrote its manifest
///
/// Deletes whichever merged segments are still present and renames the
/// compacted file over the target. Safe to run again after a crash. The
/// manifest is returned (and kept) until `repair_index` has run.
pub(crate) fn resume_interrupted_merge(dir: &Path) -> Result<Option<MergeManifest>> {
    let temp = MergeManifest::temp_path(dir);
    if temp.exists() {
        fs::remove_file(&temp)?;
    }

    let manifest = match MergeManifest::load(dir)? {
        Some(manifest) => manifest,
        None => return Ok(None),
    };

    let target = dir.join(&manifest.target);
    tracing::warn!("Resuming interrupted merge into {}", target.display());

    for name in &manifest.candidates {
        if *name == manifest.target {
            continue;
        }
        let path = dir.join(name);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| VaultError::SegmentDelete {
                path: path.clone(),
                source,
            })?;
        }
    }

    let compacted = compaction_path(&target);
    if compacted.exists() {
        fs::rename(&compacted, &target).map_err(VaultError::segment_io(&target))?;
    }
    sync_dir(dir)?;

    Ok(Some(manifest))
}

/// Point keys still indexed into a merged segment at their compacted copy
///
/// Keys written or removed after the merge started no longer point into
/// the merged segments and are left alone. Returns the number of entries
/// rewritten.
pub(crate) fn repair_index(
    index: &dyn KeyIndex,
    dir: &Path,
    manifest: &MergeManifest,
) -> Result<usize> {
    let mut repaired = 0;

    for scanned in RecordIterator::open(&dir.join(&manifest.target))? {
        let scanned = scanned?;
        let key = ByteKey::from(scanned.record.key.clone());

        let current = match index.get(&key)? {
            Some(current) => current,
            None => continue,
        };
        if !manifest.candidates.contains(&current.segment) {
            continue;
        }

        let relocated = ValueLocation::new(
            &manifest.target,
            scanned.value_offset,
            scanned.record.value_size(),
            scanned.record.timestamp,
        );
        if !current.points_to_same_value(&relocated) {
            // Ticket covered by the flush below
            index.put(key, relocated)?;
            repaired += 1;
        }
    }

    index.flush()?;
    tracing::info!("Repaired {} index entries after interrupted merge", repaired);
    Ok(repaired)
}

/// Remove compaction output that never got a manifest
pub(crate) fn remove_stale_compactions(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if crate::segment::is_compaction_file(&path) {
            tracing::warn!("Removing stale compaction file {}", path.display());
            fs::remove_file(&path).map_err(|source| VaultError::SegmentDelete {
                path: path.clone(),
                source,
            })?;
            removed += 1;
        }
    }
    Ok(removed)
}

impl Engine {
    /// Compact all sealed segments into one
    ///
    /// Steps:
    /// 1. Snapshot the sealed segments (no-op if there are fewer than two)
    /// 2. Drain the index queue so every sealed record is indexed
    /// 3. Scan the segments oldest first into key → latest location
    /// 4. Copy each value the index still points at into `<newest>.compact`
    /// 5. Write `merge.manifest` (an interrupted merge resumes from here)
    /// 6. Under the exclusive layout lock: relocate index entries, delete
    ///    the old segments, rename the compacted file over the newest and
    ///    remove the manifest
    ///
    /// Concurrent calls are serialized.
    pub fn merge(&self) -> Result<MergeStats> {
        let _merging = self.merge_lock.lock();

        // Step 1: Writers hold the layout lock shared from append to index submit,
        // so every record in a sealed segment has its index update queued after this
        let candidates = {
            let _layout = self.layout.write();
            self.segments.sealed_segments()?
        };

        if candidates.len() <= 1 {
            tracing::debug!("Merge skipped: {} sealed segment(s)", candidates.len());
            return Ok(MergeStats::default());
        }

        // Step 2: Apply everything queued so far
        self.index.flush()?;

        // Step 3: Last write wins across the candidates
        let live = collect_live(&candidates, TailPolicy::Strict)?;
        let bytes_before = total_size(&candidates)?;

        // Step 4: Write the compacted segment next to the newest candidate
        let target = match candidates.last() {
            Some(target) => target.clone(),
            None => return Ok(MergeStats::default()),
        };
        let temp = compaction_path(&target);
        if temp.exists() {
            fs::remove_file(&temp).map_err(VaultError::segment_io(&temp))?;
        }

        let mut writer = SegmentWriter::create(&temp)?;
        let mut relocations = Vec::with_capacity(live.len());

        for (key, location) in live {
            // Skip values already superseded by a later write or removed
            match self.index.get(&key)? {
                Some(current) if current.points_to_same_value(&location) => {}
                _ => continue,
            }

            let value = self
                .segments
                .read(&location.segment, location.value_offset, location.value_size)
                .wait()?;
            let record = Record::with_timestamp(location.timestamp, key.to_bytes(), value);
            let value_offset = writer.append(&record)?;

            let relocated = ValueLocation::new(
                target.clone(),
                value_offset,
                record.value_size(),
                record.timestamp,
            );
            relocations.push((key, location, relocated));
        }

        let live_keys = writer.records() as usize;
        let bytes_after = writer.finish()?;

        // Step 5: Commit; from here a crash is finished on the next open
        let dir = self.storage_dir();
        MergeManifest::new(&target, &candidates).write(dir)?;

        // Step 6: Swap the files in with no reads in flight
        {
            let _layout = self.layout.write();

            let tickets = relocations
                .into_iter()
                .map(|(key, expected, relocated)| self.index.replace_if(key, expected, relocated))
                .collect::<Result<Vec<_>>>()?;
            for ticket in tickets {
                ticket.wait()?;
            }
            self.index.flush()?;

            for path in &candidates {
                self.segments.close_handle(path)?;
                if *path == target {
                    continue;
                }
                fs::remove_file(path).map_err(|source| VaultError::SegmentDelete {
                    path: path.clone(),
                    source,
                })?;
            }

            // Replaces the newest candidate in one step
            fs::rename(&temp, &target).map_err(VaultError::segment_io(&target))?;
            MergeManifest::clear(dir)?;
        }

        let stats = MergeStats {
            segments_merged: candidates.len(),
            live_keys,
            bytes_before,
            bytes_after,
        };

        tracing::info!(
            "Merged {} segments into {}: {} live keys, {} -> {} bytes",
            stats.segments_merged,
            target.display(),
            stats.live_keys,
            stats.bytes_before,
            stats.bytes_after
        );

        Ok(stats)
    }
}
