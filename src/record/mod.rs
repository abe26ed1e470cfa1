//! Record Module
//!
//! One logical write (or tombstone) and its on-disk framing.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────┬─────────────────────────────────────────────────────┐
//! │ FrameLen (4) │ Encoded Record                                      │
//! │              │ ┌───────────┬──────────┬──────────┬─────┬─────────┐ │
//! │              │ │ Timestamp │ KeySize  │ ValSize  │ Key │  Value  │ │
//! │              │ │    (8)    │   (4)    │   (4)    │     │         │ │
//! │              │ └───────────┴──────────┴──────────┴─────┴─────────┘ │
//! └──────────────┴─────────────────────────────────────────────────────┘
//! ```
//! All integers are big-endian. Frames are written back to back with no
//! file header or footer; EOF marks the end of valid data.

mod codec;
mod iterator;

use std::time::{SystemTime, UNIX_EPOCH};

pub use codec::Record;
pub use iterator::{RecordIterator, ScannedRecord};

// =============================================================================
// Shared Constants (used by codec, iterator, segment store)
// =============================================================================

/// Size of the length prefix in front of every encoded record
pub const FRAME_HEADER_SIZE: u64 = 4;

/// Timestamp (8) + KeySize (4) + ValueSize (4)
pub const RECORD_HEADER_SIZE: u64 = 16;

/// Largest value whose frame length fits the 4-byte prefix next to a 1024-byte key
pub const MAX_RECORD_VALUE_SIZE: usize = u32::MAX as usize - RECORD_HEADER_SIZE as usize - 1024;

/// Reserved value marking a key as deleted
pub const TOMBSTONE: &[u8] = b"__bytevault_tombstone__";

/// Whether a value is the tombstone marker
pub fn is_tombstone(value: &[u8]) -> bool {
    value == TOMBSTONE
}

/// Current time as unix milliseconds
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
