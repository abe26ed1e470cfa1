//! Error types for ByteVault
//!
//! Provides a unified error type for all operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using VaultError
pub type Result<T> = std::result::Result<T, VaultError>;

/// Unified error type for ByteVault operations
#[derive(Debug, Error)]
pub enum VaultError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Segment IO error on {}: {source}", path.display())]
    SegmentIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to release segment {}: {source}", path.display())]
    SegmentDelete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // -------------------------------------------------------------------------
    // Key / Record Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Value is reserved as the tombstone marker")]
    ReservedValue,

    #[error("Key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index entry too large: {size} bytes (max {max})")]
    IndexEntryTooLarge { size: usize, max: usize },

    #[error("Index corruption detected: {0}")]
    IndexCorruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Background task aborted before completing")]
    TaskAborted,
}

impl VaultError {
    /// Builds a `map_err` adapter that tags an I/O error with its segment path
    pub fn segment_io(path: &Path) -> impl FnOnce(io::Error) -> VaultError + '_ {
        move |source| VaultError::SegmentIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this error means the key has no live value
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, VaultError::InvalidKey(_))
    }
}

impl From<bincode::Error> for VaultError {
    fn from(err: bincode::Error) -> Self {
        VaultError::Serialization(err.to_string())
    }
}
