//! Configuration for ByteVault
//!
//! Centralized configuration with sensible defaults and bounds checks.

use std::path::PathBuf;

use crate::error::{Result, VaultError};

/// Main configuration for a ByteVault instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding every segment file and the index file
    /// Internal structure:
    ///   {storage_dir}/
    ///     ├── segment_<millis>   (sealed segments, oldest first)
    ///     ├── segment_<millis>   (active segment, newest)
    ///     └── index.db           (persisted B-tree index)
    pub storage_dir: PathBuf,

    /// Size at which the active segment is sealed and a new one started (bytes)
    pub segment_size_limit: u64,

    /// Sync strategy: how often to fsync the active segment
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Persist the key index as an on-disk B-tree. When disabled, an
    /// in-memory key directory is rebuilt from the segments on open.
    pub index_enabled: bool,

    /// Maximum number of queued index mutations before `set`/`remove` block
    pub index_queue_capacity: usize,

    // -------------------------------------------------------------------------
    // Background Work
    // -------------------------------------------------------------------------
    /// Suggested interval between merges (milliseconds). Informational:
    /// the engine never schedules merges on its own.
    pub merge_period_ms: u64,

    /// Number of worker threads serving value reads
    pub read_workers: usize,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N appends (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./bytevault_data"),
            segment_size_limit: 10_240_000,
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            index_enabled: true,
            index_queue_capacity: 10_000,
            merge_period_ms: 300_000,
            read_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check every bound; used by the builder and by `Engine::open`
    pub fn validate(&self) -> Result<()> {
        if self.storage_dir.as_os_str().is_empty() {
            return Err(VaultError::InvalidConfig(
                "storage_dir must not be empty".to_string(),
            ));
        }
        if self.segment_size_limit == 0 {
            return Err(VaultError::InvalidConfig(
                "segment_size_limit must be greater than 0".to_string(),
            ));
        }
        if self.index_enabled && self.index_queue_capacity == 0 {
            return Err(VaultError::InvalidConfig(
                "index_queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.merge_period_ms == 0 {
            return Err(VaultError::InvalidConfig(
                "merge_period_ms must be greater than 0".to_string(),
            ));
        }
        if self.read_workers == 0 {
            return Err(VaultError::InvalidConfig(
                "read_workers must be greater than 0".to_string(),
            ));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(VaultError::InvalidConfig(
                "sync_strategy count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the storage directory
    pub fn storage_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = path.into();
        self
    }

    /// Set the segment size limit (in bytes)
    pub fn segment_size_limit(mut self, bytes: u64) -> Self {
        self.config.segment_size_limit = bytes;
        self
    }

    /// Set the segment sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Enable or disable the on-disk index
    pub fn index_enabled(mut self, enabled: bool) -> Self {
        self.config.index_enabled = enabled;
        self
    }

    /// Set the index mutation queue capacity
    pub fn index_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.index_queue_capacity = capacity;
        self
    }

    /// Set the suggested merge period (in milliseconds)
    pub fn merge_period_ms(mut self, ms: u64) -> Self {
        self.config.merge_period_ms = ms;
        self
    }

    /// Set the number of read workers
    pub fn read_workers(mut self, workers: usize) -> Self {
        self.config.read_workers = workers;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
