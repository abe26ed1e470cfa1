//! Disk Index
//!
//! The persisted B-tree behind a single-worker task queue.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::pool::TaskPool;

use super::{BTree, ByteKey, IndexTicket, KeyIndex, ValueLocation};

/// On-disk key index
///
/// Reads go straight to the tree (shared lock). Mutations are queued on a
/// bounded channel and applied one at a time, in submission order, by a
/// dedicated writer thread; callers may wait on the returned ticket.
pub struct DiskIndex {
    tree: Arc<BTree<ValueLocation>>,
    /// Single worker => FIFO application of mutations
    writer: TaskPool,
}

impl DiskIndex {
    /// Open or create the index file
    pub fn open(path: &Path, queue_capacity: usize) -> Result<Self> {
        let tree = Arc::new(BTree::open(path)?);
        let writer = TaskPool::bounded("bytevault-index", 1, queue_capacity)?;
        tracing::info!("Opened disk index at {}", path.display());
        Ok(Self { tree, writer })
    }

    /// Submit a mutation to the writer; failures are logged and reported through the ticket
    fn enqueue<F>(&self, what: &'static str, key: ByteKey, mutation: F) -> IndexTicket
    where
        F: FnOnce(&BTree<ValueLocation>, &ByteKey) -> Result<()> + Send + 'static,
    {
        let tree = Arc::clone(&self.tree);
        self.writer.submit(move || {
            let result = mutation(&tree, &key);
            if let Err(e) = &result {
                tracing::error!("Index {} failed for key {}: {}", what, key, e);
            }
            result
        })
    }

    /// Mutations waiting to be applied
    pub fn pending(&self) -> usize {
        self.writer.queued()
    }

    /// Snapshot of every entry in key order (waits for nothing)
    pub fn entries(&self) -> Result<Vec<(ByteKey, ValueLocation)>> {
        self.tree.entries()
    }
}

impl KeyIndex for DiskIndex {
    fn get(&self, key: &ByteKey) -> Result<Option<ValueLocation>> {
        self.tree.get(key)
    }

    fn put(&self, key: ByteKey, location: ValueLocation) -> Result<IndexTicket> {
        Ok(self.enqueue("insert", key, move |tree, key| {
            tree.insert(key.clone(), location)
        }))
    }

    fn delete(&self, key: ByteKey) -> Result<IndexTicket> {
        Ok(self.enqueue("delete", key, |tree, key| {
            tree.delete(key).map(|_| ())
        }))
    }

    fn replace_if(
        &self,
        key: ByteKey,
        expected: ValueLocation,
        location: ValueLocation,
    ) -> Result<IndexTicket> {
        Ok(self.enqueue("relocate", key, move |tree, key| {
            match tree.get(key)? {
                Some(current) if current.points_to_same_value(&expected) => {
                    tree.insert(key.clone(), location)
                }
                _ => {
                    tracing::debug!("Skipping relocation of {}: superseded", key);
                    Ok(())
                }
            }
        }))
    }

    fn flush(&self) -> Result<()> {
        // The barrier runs after every earlier mutation
        let tree = Arc::clone(&self.tree);
        self.writer.submit(move || tree.sync()).wait()
    }

    fn len(&self) -> Result<usize> {
        self.tree.len()
    }
}
