//! Index Module
//!
//! Maps each live key to the location of its latest value.
//!
//! ## Responsibilities
//! - Persisted B-tree index (`DiskIndex`) with mutations applied in order
//!   by a dedicated writer task
//! - In-memory key directory (`KeyDir`) when the on-disk index is disabled
//! - Conditional relocation (`replace_if`) for merge
//!
//! ## Consistency
//! `get` is synchronous and sees every mutation that has completed.
//! `put`/`delete` return an `IndexTicket`; the mutation is only guaranteed
//! visible once that ticket (or a later `flush`) has completed.

mod btree;
mod disk;
mod key;
mod keydir;
mod location;
mod node;
mod pager;

pub use btree::BTree;
pub use disk::DiskIndex;
pub use key::ByteKey;
pub use keydir::KeyDir;
pub use location::ValueLocation;
pub use node::{MAX_KEY_SIZE, MAX_VALUE_SIZE, ORDER, PAGE_SIZE};

use crate::error::Result;
use crate::pool::TaskHandle;

/// Completion handle for an index mutation
pub type IndexTicket = TaskHandle<()>;

/// File name of the persisted index inside the storage directory
pub const INDEX_FILE_NAME: &str = "index.db";

/// Key → value-location index used by the engine
pub trait KeyIndex: Send + Sync {
    /// Current location for `key`
    fn get(&self, key: &ByteKey) -> Result<Option<ValueLocation>>;

    /// Point `key` at `location`
    fn put(&self, key: ByteKey, location: ValueLocation) -> Result<IndexTicket>;

    /// Remove `key` (absent keys are a no-op)
    fn delete(&self, key: ByteKey) -> Result<IndexTicket>;

    /// Point `key` at `location` only if it still points at `expected`
    fn replace_if(
        &self,
        key: ByteKey,
        expected: ValueLocation,
        location: ValueLocation,
    ) -> Result<IndexTicket>;

    /// Wait until every earlier mutation is applied and durable
    fn flush(&self) -> Result<()>;

    /// Number of live keys
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
