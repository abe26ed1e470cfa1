//! Tests for DiskIndex and KeyDir
//!
//! These tests verify:
//! - Queued mutations are applied in submission order
//! - Tickets complete once the mutation is visible
//! - Conditional relocation only replaces the expected location
//! - Flush persists the index across reopen
//! - KeyDir rebuilds last-write-wins state from segment files

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use bytevault::index::{ByteKey, DiskIndex, KeyDir, KeyIndex, ValueLocation};
use bytevault::record::Record;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_index() -> (TempDir, DiskIndex) {
    let temp_dir = TempDir::new().unwrap();
    let index = DiskIndex::open(&temp_dir.path().join("index.db"), 64).unwrap();
    (temp_dir, index)
}

fn location(segment: &str, offset: u64) -> ValueLocation {
    ValueLocation::new(PathBuf::from(segment), offset, 8, 1)
}

fn write_segment(path: &std::path::Path, records: &[Record]) {
    let mut file = fs::File::create(path).unwrap();
    for record in records {
        file.write_all(&record.encode_frame()).unwrap();
    }
}

// =============================================================================
// DiskIndex Tests
// =============================================================================

#[test]
fn test_put_visible_after_ticket() {
    let (_temp, index) = setup_temp_index();

    index
        .put(ByteKey::from("a"), location("segment_1", 20))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(
        index.get(&ByteKey::from("a")).unwrap(),
        Some(location("segment_1", 20))
    );
    assert_eq!(index.len().unwrap(), 1);
}

#[test]
fn test_mutations_apply_in_order() {
    let (_temp, index) = setup_temp_index();

    for i in 0..100 {
        index
            .put(ByteKey::from("hot"), location("segment_1", i))
            .unwrap();
    }
    index.delete(ByteKey::from("hot")).unwrap();
    index
        .put(ByteKey::from("hot"), location("segment_2", 7))
        .unwrap();
    index.flush().unwrap();

    assert_eq!(
        index.get(&ByteKey::from("hot")).unwrap(),
        Some(location("segment_2", 7))
    );
    assert_eq!(index.pending(), 0);
}

#[test]
fn test_delete_absent_key_completes() {
    let (_temp, index) = setup_temp_index();
    index.delete(ByteKey::from("missing")).unwrap().wait().unwrap();
    assert!(index.is_empty().unwrap());
}

#[test]
fn test_replace_if_matches_current_location() {
    let (_temp, index) = setup_temp_index();
    let key = ByteKey::from("k");

    index.put(key.clone(), location("segment_1", 40)).unwrap();
    index
        .replace_if(key.clone(), location("segment_1", 40), location("segment_9", 4))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(index.get(&key).unwrap(), Some(location("segment_9", 4)));
}

#[test]
fn test_replace_if_skips_superseded_location() {
    let (_temp, index) = setup_temp_index();
    let key = ByteKey::from("k");

    index.put(key.clone(), location("segment_1", 40)).unwrap();
    // A newer write lands before the relocation
    index.put(key.clone(), location("segment_5", 0)).unwrap();
    index
        .replace_if(key.clone(), location("segment_1", 40), location("segment_9", 4))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(index.get(&key).unwrap(), Some(location("segment_5", 0)));
}

#[test]
fn test_replace_if_does_not_resurrect_deleted_key() {
    let (_temp, index) = setup_temp_index();
    let key = ByteKey::from("k");

    index.put(key.clone(), location("segment_1", 40)).unwrap();
    index.delete(key.clone()).unwrap();
    index
        .replace_if(key.clone(), location("segment_1", 40), location("segment_9", 4))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(index.get(&key).unwrap(), None);
}

#[test]
fn test_flush_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("index.db");

    {
        let index = DiskIndex::open(&path, 16).unwrap();
        for i in 0..40u64 {
            index
                .put(ByteKey::from(format!("key{}", i).as_str()), location("segment_1", i))
                .unwrap();
        }
        index.flush().unwrap();
    }

    let index = DiskIndex::open(&path, 16).unwrap();
    assert_eq!(index.len().unwrap(), 40);
    assert_eq!(
        index.get(&ByteKey::from("key33")).unwrap(),
        Some(location("segment_1", 33))
    );
}

#[test]
fn test_entries_in_key_order() {
    let (_temp, index) = setup_temp_index();

    for k in ["pear", "apple", "fig"] {
        index.put(ByteKey::from(k), location("segment_1", 0)).unwrap();
    }
    index.flush().unwrap();

    let keys: Vec<String> = index
        .entries()
        .unwrap()
        .into_iter()
        .map(|(k, _)| k.to_string())
        .collect();
    assert_eq!(keys, vec!["apple", "fig", "pear"]);
}

// =============================================================================
// KeyDir Tests
// =============================================================================

#[test]
fn test_keydir_applies_synchronously() {
    let dir = KeyDir::new();
    let key = ByteKey::from("k");

    let ticket = dir.put(key.clone(), location("segment_1", 1)).unwrap();
    assert!(ticket.is_finished());
    assert_eq!(dir.get(&key).unwrap(), Some(location("segment_1", 1)));

    dir.replace_if(key.clone(), location("segment_1", 2), location("segment_2", 0))
        .unwrap();
    assert_eq!(dir.get(&key).unwrap(), Some(location("segment_1", 1)));

    dir.delete(key.clone()).unwrap();
    assert_eq!(dir.get(&key).unwrap(), None);
}

#[test]
fn test_keydir_rebuild_last_write_wins() {
    let temp_dir = TempDir::new().unwrap();
    let older = temp_dir.path().join("segment_100");
    let newer = temp_dir.path().join("segment_200");

    write_segment(
        &older,
        &[
            Record::with_timestamp(1, &b"a"[..], &b"1"[..]),
            Record::with_timestamp(2, &b"b"[..], &b"2"[..]),
            Record::with_timestamp(3, &b"c"[..], &b"3"[..]),
        ],
    );
    write_segment(
        &newer,
        &[
            Record::with_timestamp(4, &b"a"[..], &b"one"[..]),
            Record::tombstone(&b"b"[..]),
        ],
    );

    let dir = KeyDir::rebuild(&[older.clone(), newer.clone()]).unwrap();

    assert_eq!(dir.len().unwrap(), 2);
    let a = dir.get(&ByteKey::from("a")).unwrap().unwrap();
    assert_eq!(a.segment, PathBuf::from("segment_200"));
    assert_eq!(a.resolve(temp_dir.path()), newer);
    assert_eq!(a.value_size, 3);
    assert_eq!(a.timestamp, 4);
    assert_eq!(dir.get(&ByteKey::from("b")).unwrap(), None);
    let c = dir.get(&ByteKey::from("c")).unwrap().unwrap();
    assert_eq!(c.resolve(temp_dir.path()), older);
}

#[test]
fn test_keydir_rebuild_tolerates_torn_tail() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("segment_100");

    write_segment(&path, &[Record::with_timestamp(1, &b"a"[..], &b"1"[..])]);
    let torn = Record::with_timestamp(2, &b"b"[..], &b"2"[..]).encode_frame();
    let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&torn[..torn.len() - 1]).unwrap();
    drop(file);

    let dir = KeyDir::rebuild(&[path]).unwrap();
    assert_eq!(dir.len().unwrap(), 1);
    assert!(dir.get(&ByteKey::from("a")).unwrap().is_some());
    assert!(dir.get(&ByteKey::from("b")).unwrap().is_none());
}
