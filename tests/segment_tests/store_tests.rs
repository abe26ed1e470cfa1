//! Tests for the Segment Store
//!
//! These tests verify:
//! - A fresh active segment is created on open
//! - Value offsets returned by append address the value bytes
//! - Size-based rotation (checked before each write)
//! - Pooled reads across sealed and active segments
//! - Segment naming and listing order

use std::fs;
use std::sync::Arc;
use std::thread;

use bytevault::config::{Config, SyncStrategy};
use bytevault::record::Record;
use bytevault::segment::{
    compaction_path, is_compaction_file, list_segments, parse_segment_timestamp,
    segment_file_name, SegmentStore,
};
use bytevault::VaultError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store(size_limit: u64) -> (TempDir, SegmentStore) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .storage_dir(temp_dir.path())
        .segment_size_limit(size_limit)
        .sync_strategy(SyncStrategy::EveryWrite)
        .read_workers(2)
        .build()
        .unwrap();
    let store = SegmentStore::open(&config).unwrap();
    (temp_dir, store)
}

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_segment_name_roundtrip() {
    let name = segment_file_name(1700000000000);
    assert_eq!(name, "segment_1700000000000");

    let path = std::path::Path::new("/tmp").join(&name);
    assert_eq!(parse_segment_timestamp(&path), Some(1700000000000));
}

#[test]
fn test_compaction_path_is_not_a_segment() {
    let target = std::path::Path::new("/data/segment_42");
    let temp = compaction_path(target);

    assert_eq!(temp, std::path::Path::new("/data/segment_42.compact"));
    assert!(is_compaction_file(&temp));
    assert!(!is_compaction_file(target));
    assert_eq!(parse_segment_timestamp(&temp), None);
}

#[test]
fn test_list_segments_sorted_by_timestamp() {
    let temp_dir = TempDir::new().unwrap();
    for ts in [300u64, 20, 1000] {
        fs::write(temp_dir.path().join(segment_file_name(ts)), b"").unwrap();
    }
    fs::write(temp_dir.path().join("index.db"), b"").unwrap();
    fs::write(temp_dir.path().join("segment_20.compact"), b"").unwrap();

    let segments = list_segments(temp_dir.path()).unwrap();
    let stamps: Vec<_> = segments
        .iter()
        .map(|p| parse_segment_timestamp(p).unwrap())
        .collect();

    assert_eq!(stamps, vec![20, 300, 1000]);
}

// =============================================================================
// Append / Read Tests
// =============================================================================

#[test]
fn test_open_creates_empty_active_segment() {
    let (temp, store) = setup_temp_store(1024);

    let active = store.active_path();
    assert!(active.exists());
    assert_eq!(active.parent().unwrap(), temp.path());
    assert_eq!(store.segments().unwrap(), vec![active]);
    assert!(store.sealed_segments().unwrap().is_empty());
    assert_eq!(store.active_size(), 0);
}

#[test]
fn test_append_returns_value_offset() {
    let (_temp, store) = setup_temp_store(1024 * 1024);

    let first = Record::new(&b"alpha"[..], &b"one"[..]);
    let second = Record::new(&b"beta"[..], &b"two"[..]);

    let a = store.append(&first).unwrap();
    let b = store.append(&second).unwrap();

    assert_eq!(a.path, b.path);
    assert_eq!(a.value_offset, first.value_offset_in_frame());
    assert_eq!(
        b.value_offset,
        first.encode_frame().len() as u64 + second.value_offset_in_frame()
    );

    let bytes = fs::read(&a.path).unwrap();
    assert_eq!(&bytes[a.value_offset as usize..a.value_offset as usize + 3], b"one");
    assert_eq!(&bytes[b.value_offset as usize..b.value_offset as usize + 3], b"two");
}

#[test]
fn test_read_through_pool() {
    let (_temp, store) = setup_temp_store(1024 * 1024);

    let appended = store.append(&Record::new(&b"k"[..], &b"payload"[..])).unwrap();
    let value = store
        .read(&appended.path, appended.value_offset, 7)
        .wait()
        .unwrap();

    assert_eq!(&value[..], b"payload");
}

#[test]
fn test_read_past_end_fails() {
    let (_temp, store) = setup_temp_store(1024 * 1024);

    let appended = store.append(&Record::new(&b"k"[..], &b"v"[..])).unwrap();
    let result = store.read(&appended.path, appended.value_offset, 100).wait();

    assert!(matches!(result, Err(VaultError::SegmentIo { .. })));
}

#[test]
fn test_read_missing_segment_fails() {
    let (temp, store) = setup_temp_store(1024);
    let result = store.read(&temp.path().join("segment_1"), 0, 1).wait();
    assert!(matches!(result, Err(VaultError::SegmentIo { .. })));
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_rotation_happens_on_next_write() {
    let (_temp, store) = setup_temp_store(64);

    // One record larger than the limit still lands in the first segment
    let big = Record::new(&b"big"[..], vec![b'x'; 100]);
    let first = store.append(&big).unwrap();
    assert_eq!(store.segments().unwrap().len(), 1);
    assert!(store.active_size() > 64);

    // The next append rotates first
    let second = store.append(&Record::new(&b"small"[..], &b"v"[..])).unwrap();
    assert_ne!(first.path, second.path);
    assert_eq!(second.value_offset, Record::new(&b"small"[..], &b"v"[..]).value_offset_in_frame());

    let segments = store.segments().unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(store.sealed_segments().unwrap(), vec![first.path.clone()]);
    assert_eq!(store.active_path(), second.path);
}

#[test]
fn test_rotated_segment_names_increase() {
    let (_temp, store) = setup_temp_store(1);

    for i in 0..5 {
        store
            .append(&Record::new(format!("k{}", i).into_bytes(), &b"v"[..]))
            .unwrap();
    }

    let stamps: Vec<_> = store
        .segments()
        .unwrap()
        .iter()
        .map(|p| parse_segment_timestamp(p).unwrap())
        .collect();
    assert_eq!(stamps.len(), 5);
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_values_readable_after_rotation() {
    let (_temp, store) = setup_temp_store(50);

    let mut written = Vec::new();
    for i in 0..20 {
        let value = format!("value-{}", i);
        let appended = store
            .append(&Record::new(format!("key-{}", i).into_bytes(), value.clone().into_bytes()))
            .unwrap();
        written.push((appended, value));
    }
    assert!(store.segments().unwrap().len() > 1);

    for (appended, value) in written {
        let read = store
            .read(&appended.path, appended.value_offset, value.len() as u32)
            .wait()
            .unwrap();
        assert_eq!(&read[..], value.as_bytes());
    }
}

#[test]
fn test_reopen_starts_new_active_segment() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .storage_dir(temp_dir.path())
        .build()
        .unwrap();

    let first_active = {
        let store = SegmentStore::open(&config).unwrap();
        store.append(&Record::new(&b"k"[..], &b"v"[..])).unwrap();
        store.sync().unwrap();
        store.active_path()
    };

    let store = SegmentStore::open(&config).unwrap();
    assert_ne!(store.active_path(), first_active);
    assert_eq!(store.sealed_segments().unwrap(), vec![first_active]);
}

// =============================================================================
// Handle Cache Tests
// =============================================================================

#[test]
fn test_close_handle_releases_cache_entry() {
    let (_temp, store) = setup_temp_store(1);

    let first = store.append(&Record::new(&b"a"[..], &b"1"[..])).unwrap();
    store.append(&Record::new(&b"b"[..], &b"2"[..])).unwrap();
    store.read(&first.path, first.value_offset, 1).wait().unwrap();

    let before = store.open_handles();
    store.close_handle(&first.path).unwrap();
    assert_eq!(store.open_handles(), before - 1);

    // Closing an unknown path is a no-op
    store.close_handle(&first.path).unwrap();

    // A later read reopens it
    let value = store.read(&first.path, first.value_offset, 1).wait().unwrap();
    assert_eq!(&value[..], b"1");
}

#[test]
fn test_concurrent_appends_and_reads() {
    let (_temp, store) = setup_temp_store(512);
    let store = Arc::new(store);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..50 {
                    let value = format!("t{}-v{}", t, i);
                    let appended = store
                        .append(&Record::new(
                            format!("t{}-k{}", t, i).into_bytes(),
                            value.clone().into_bytes(),
                        ))
                        .unwrap();
                    let read = store
                        .read(&appended.path, appended.value_offset, value.len() as u32)
                        .wait()
                        .unwrap();
                    assert_eq!(&read[..], value.as_bytes());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(store.segments().unwrap().len() > 1);
}
