//! Tests for Config and ConfigBuilder
//!
//! These tests verify:
//! - Defaults
//! - Builder setters
//! - Validation of every bound

use bytevault::config::{Config, SyncStrategy};
use bytevault::VaultError;

// =============================================================================
// Helper Functions
// =============================================================================

fn assert_invalid(result: bytevault::Result<Config>) {
    assert!(
        matches!(result, Err(VaultError::InvalidConfig(_))),
        "expected InvalidConfig, got {:?}",
        result
    );
}

// =============================================================================
// Defaults Tests
// =============================================================================

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.storage_dir, std::path::PathBuf::from("./bytevault_data"));
    assert_eq!(config.segment_size_limit, 10_240_000);
    assert!(config.index_enabled);
    assert_eq!(config.index_queue_capacity, 10_000);
    assert_eq!(config.merge_period_ms, 300_000);
    assert!(config.read_workers > 0);
    assert_eq!(config.sync_strategy, SyncStrategy::EveryNEntries { count: 100 });
    assert!(config.validate().is_ok());
}

#[test]
fn test_builder_sets_fields() {
    let config = Config::builder()
        .storage_dir("/tmp/bytevault_test")
        .segment_size_limit(4096)
        .sync_strategy(SyncStrategy::EveryWrite)
        .index_enabled(false)
        .index_queue_capacity(8)
        .merge_period_ms(1_000)
        .read_workers(3)
        .build()
        .unwrap();

    assert_eq!(config.storage_dir, std::path::PathBuf::from("/tmp/bytevault_test"));
    assert_eq!(config.segment_size_limit, 4096);
    assert_eq!(config.sync_strategy, SyncStrategy::EveryWrite);
    assert!(!config.index_enabled);
    assert_eq!(config.index_queue_capacity, 8);
    assert_eq!(config.merge_period_ms, 1_000);
    assert_eq!(config.read_workers, 3);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_rejects_empty_storage_dir() {
    assert_invalid(Config::builder().storage_dir("").build());
}

#[test]
fn test_rejects_zero_segment_size() {
    assert_invalid(Config::builder().segment_size_limit(0).build());
}

#[test]
fn test_rejects_zero_queue_capacity_with_index() {
    assert_invalid(Config::builder().index_queue_capacity(0).build());

    // Irrelevant without the disk index
    assert!(Config::builder()
        .index_enabled(false)
        .index_queue_capacity(0)
        .build()
        .is_ok());
}

#[test]
fn test_rejects_zero_merge_period() {
    assert_invalid(Config::builder().merge_period_ms(0).build());
}

#[test]
fn test_rejects_zero_read_workers() {
    assert_invalid(Config::builder().read_workers(0).build());
}

#[test]
fn test_rejects_zero_sync_count() {
    assert_invalid(
        Config::builder()
            .sync_strategy(SyncStrategy::EveryNEntries { count: 0 })
            .build(),
    );
}
