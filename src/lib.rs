//! # ByteVault
//!
//! A Bitcask-style embedded key-value store with:
//! - Append-only segment files with size-based rotation
//! - A persisted B-tree index mapping keys to value locations
//! - Asynchronous index updates with explicit completion tickets
//! - Online compaction (merge) of sealed segments
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │              get / set / remove / merge                     │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌────────────────────────┐      ┌────────────────────────┐
//!   │     Segment Store      │      │         Index          │
//!   │  active + sealed logs  │      │  B-tree (index.db) or  │
//!   │  pooled value reads    │      │  in-memory key dir     │
//!   └───────────┬────────────┘      └───────────┬────────────┘
//!               │                               │
//!               ▼                               ▼
//!   ┌────────────────────────┐      ┌────────────────────────┐
//!   │      Record Codec      │      │   Index writer task    │
//!   │  [len][ts|ks|vs|k|v]   │      │  (FIFO, bounded queue) │
//!   └────────────────────────┘      └────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod pool;

pub mod record;
pub mod segment;
pub mod index;
pub mod merge;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, VaultError};
pub use config::{Config, ConfigBuilder, SyncStrategy};
pub use pool::{TaskHandle, TaskPool};
pub use record::{Record, RecordIterator};
pub use segment::SegmentStore;
pub use index::{BTree, ByteKey, DiskIndex, IndexTicket, KeyDir, KeyIndex, ValueLocation};
pub use merge::MergeStats;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ByteVault
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
