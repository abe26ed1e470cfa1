//! Page file
//!
//! Fixed-size page I/O over the index file plus page allocation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, VaultError};

use super::node::{Node, PAGE_SIZE};

/// Page-granular access to the index file
///
/// Reads take `&self` (the file handle has its own mutex so concurrent
/// tree readers can share the pager); allocation and writes need `&mut`.
pub(crate) struct Pager {
    file: Mutex<File>,
    /// Pages currently in the file
    page_count: u64,
    /// Offsets of unreachable pages available for reuse
    free: Vec<u64>,
}

impl Pager {
    /// Open or create the index file; returns the pager and whether it was empty
    pub fn open(path: &Path) -> Result<(Self, bool)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(VaultError::IndexCorruption(format!(
                "index file {} has length {} (not a multiple of {})",
                path.display(),
                len,
                PAGE_SIZE
            )));
        }

        let pager = Self {
            file: Mutex::new(file),
            page_count: len / PAGE_SIZE as u64,
            free: Vec::new(),
        };
        Ok((pager, len == 0))
    }

    pub fn read_node<V: Serialize + DeserializeOwned>(&self, offset: u64) -> Result<Node<V>> {
        if !self.contains(offset) {
            return Err(VaultError::IndexCorruption(format!(
                "page offset {} outside index file",
                offset
            )));
        }

        let mut page = vec![0u8; PAGE_SIZE];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut page)?;
        }
        Node::decode(offset, &page)
    }

    pub fn write_node<V: Serialize + DeserializeOwned>(&mut self, node: &Node<V>) -> Result<()> {
        let page = node.encode()?;
        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(node.offset))?;
        file.write_all(&page)?;

        let end_page = node.offset / PAGE_SIZE as u64 + 1;
        if end_page > self.page_count {
            self.page_count = end_page;
        }
        Ok(())
    }

    /// Hand out a free page, or the next page past the end of the file
    pub fn allocate(&mut self) -> u64 {
        if let Some(offset) = self.free.pop() {
            return offset;
        }
        let offset = self.page_count * PAGE_SIZE as u64;
        self.page_count += 1;
        offset
    }

    pub fn release(&mut self, offset: u64) {
        self.free.push(offset);
    }

    /// Replace the free list with every page not in `reachable`
    pub fn reset_free_pages(&mut self, reachable: &std::collections::HashSet<u64>) {
        self.free = (0..self.page_count)
            .map(|page| page * PAGE_SIZE as u64)
            .filter(|offset| !reachable.contains(offset))
            .collect();
        // Reuse low offsets first
        self.free.reverse();
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset % PAGE_SIZE as u64 == 0 && offset / (PAGE_SIZE as u64) < self.page_count
    }

    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    pub fn free_pages(&self) -> usize {
        self.free.len()
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}
