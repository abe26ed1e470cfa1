//! Persisted B-tree
//!
//! A disk-backed B-tree of order `t = 4` mapping raw byte keys to values.
//! Nodes live in fixed-size pages of a single index file; the root page is
//! always at offset 0. Nodes are loaded and saved individually, so the
//! tree never has to fit in memory.
//!
//! ## Algorithms
//! - Insert: split a full root first (the old root moves to a new page),
//!   then descend, splitting any full child before entering it.
//! - Delete: descend while keeping every visited child above `t - 1` keys
//!   (borrow from a sibling or merge with one); keys found in internal
//!   nodes are replaced by their predecessor or successor.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, VaultError};

use super::node::{Node, MAX_KEY_SIZE, MAX_VALUE_SIZE, ROOT_OFFSET};
use super::pager::Pager;
use super::ByteKey;

/// Disk-backed B-tree
///
/// ## Concurrency:
/// - One reader/writer lock guards the whole tree
/// - `get`/`entries` share the read lock
/// - `insert`/`delete` hold the write lock until every page is written
pub struct BTree<V> {
    path: PathBuf,
    pager: RwLock<Pager>,
    _values: PhantomData<fn() -> V>,
}

impl<V> BTree<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Open or create a tree in the given index file
    ///
    /// On open:
    /// 1. Create an empty leaf root if the file is new
    /// 2. Walk every reachable page (validating checksums)
    /// 3. Put unreachable pages on the free list
    pub fn open(path: &Path) -> Result<Self> {
        let (mut pager, fresh) = Pager::open(path)?;

        if fresh {
            let root: Node<V> = Node::new(ROOT_OFFSET, true);
            pager.write_node(&root)?;
        } else {
            let reachable = Self::reachable_pages(&pager)?;
            pager.reset_free_pages(&reachable);
            tracing::debug!(
                "Opened index {} with {} pages ({} free)",
                path.display(),
                pager.page_count(),
                pager.free_pages()
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            pager: RwLock::new(pager),
            _values: PhantomData,
        })
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find the value stored for `key`
    pub fn get(&self, key: &ByteKey) -> Result<Option<V>> {
        let pager = self.pager.read();
        let mut node: Node<V> = pager.read_node(ROOT_OFFSET)?;

        loop {
            match node.search(key) {
                Ok(i) => return Ok(Some(node.values[i].clone())),
                Err(_) if node.leaf => return Ok(None),
                Err(i) => node = pager.read_node(node.child(i)?)?,
            }
        }
    }

    /// All entries in key order
    pub fn entries(&self) -> Result<Vec<(ByteKey, V)>> {
        let pager = self.pager.read();
        let mut out = Vec::new();
        Self::collect(&pager, ROOT_OFFSET, &mut out)?;
        Ok(out)
    }

    /// Number of stored keys
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        let pager = self.pager.read();
        let root: Node<V> = pager.read_node(ROOT_OFFSET)?;
        Ok(root.keys.is_empty())
    }

    fn collect(pager: &Pager, offset: u64, out: &mut Vec<(ByteKey, V)>) -> Result<()> {
        let node: Node<V> = pager.read_node(offset)?;
        for i in 0..node.keys.len() {
            if !node.leaf {
                Self::collect(pager, node.child(i)?, out)?;
            }
            out.push((node.keys[i].clone(), node.values[i].clone()));
        }
        if !node.leaf {
            Self::collect(pager, node.child(node.keys.len())?, out)?;
        }
        Ok(())
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Insert or replace the value for `key`
    pub fn insert(&self, key: ByteKey, value: V) -> Result<()> {
        Self::check_entry(&key, &value)?;

        let mut pager = self.pager.write();
        let mut root: Node<V> = pager.read_node(ROOT_OFFSET)?;

        if root.is_full() {
            // Tree grows one level; the root page keeps offset 0
            let moved = pager.allocate();
            root.offset = moved;
            let mut new_root = Node::new(ROOT_OFFSET, false);
            new_root.children.push(moved);
            Self::split_child(&mut pager, &mut new_root, 0, &mut root)?;
            root = new_root;
        }

        Self::insert_non_full(&mut pager, &mut root, key, value)
    }

    fn check_entry(key: &ByteKey, value: &V) -> Result<()> {
        if key.len() > MAX_KEY_SIZE {
            return Err(VaultError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        let value_size = bincode::serialized_size(value)? as usize;
        if value_size > MAX_VALUE_SIZE {
            return Err(VaultError::IndexEntryTooLarge {
                size: value_size,
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(())
    }

    fn insert_non_full(pager: &mut Pager, node: &mut Node<V>, key: ByteKey, value: V) -> Result<()> {
        match node.search(&key) {
            Ok(i) => {
                node.values[i] = value;
                pager.write_node(node)
            }
            Err(i) if node.leaf => {
                node.keys.insert(i, key);
                node.values.insert(i, value);
                pager.write_node(node)
            }
            Err(mut i) => {
                let mut child: Node<V> = pager.read_node(node.child(i)?)?;
                if child.is_full() {
                    Self::split_child(pager, node, i, &mut child)?;
                    match key.cmp(&node.keys[i]) {
                        Ordering::Equal => {
                            node.values[i] = value;
                            return pager.write_node(node);
                        }
                        Ordering::Greater => {
                            i += 1;
                            child = pager.read_node(node.child(i)?)?;
                        }
                        Ordering::Less => {}
                    }
                }
                Self::insert_non_full(pager, &mut child, key, value)
            }
        }
    }

    /// Split the full `child` at `parent.children[index]` around its median
    fn split_child(
        pager: &mut Pager,
        parent: &mut Node<V>,
        index: usize,
        child: &mut Node<V>,
    ) -> Result<()> {
        let mut sibling = Node::new(pager.allocate(), child.leaf);

        // Upper half moves right; the median (slot t-1) moves up
        let median = super::node::ORDER - 1;
        sibling.keys = child.keys.split_off(median + 1);
        sibling.values = child.values.split_off(median + 1);
        if !child.leaf {
            sibling.children = child.children.split_off(median + 1);
        }

        let (Some(separator_key), Some(separator_value)) = (child.keys.pop(), child.values.pop())
        else {
            return Err(VaultError::IndexCorruption(format!(
                "split of under-full node at {}",
                child.offset
            )));
        };

        parent.keys.insert(index, separator_key);
        parent.values.insert(index, separator_value);
        parent.children.insert(index + 1, sibling.offset);

        pager.write_node(child)?;
        pager.write_node(&sibling)?;
        pager.write_node(parent)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove `key`; returns whether it was present
    pub fn delete(&self, key: &ByteKey) -> Result<bool> {
        let mut pager = self.pager.write();
        let mut root: Node<V> = pager.read_node(ROOT_OFFSET)?;

        let removed = Self::delete_from(&mut pager, &mut root, key)?;

        if root.keys.is_empty() && !root.leaf {
            // Tree shrinks one level; the only child takes over offset 0
            let mut child: Node<V> = pager.read_node(root.child(0)?)?;
            pager.release(child.offset);
            child.offset = ROOT_OFFSET;
            pager.write_node(&child)?;
        }

        Ok(removed)
    }

    fn delete_from(pager: &mut Pager, node: &mut Node<V>, key: &ByteKey) -> Result<bool> {
        match node.search(key) {
            Ok(i) if node.leaf => {
                node.keys.remove(i);
                node.values.remove(i);
                pager.write_node(node)?;
                Ok(true)
            }
            Ok(i) => Self::delete_internal(pager, node, i),
            Err(_) if node.leaf => Ok(false),
            Err(i) => {
                let mut child = Self::prepare_child(pager, node, i)?;
                Self::delete_from(pager, &mut child, key)
            }
        }
    }

    /// Remove `node.keys[index]` from an internal node
    fn delete_internal(pager: &mut Pager, node: &mut Node<V>, index: usize) -> Result<bool> {
        let mut left: Node<V> = pager.read_node(node.child(index)?)?;
        if left.has_spare_key() {
            let (pred_key, pred_value) = Self::rightmost_entry(pager, &left)?;
            node.keys[index] = pred_key.clone();
            node.values[index] = pred_value;
            pager.write_node(node)?;
            return Self::delete_from(pager, &mut left, &pred_key);
        }

        let mut right: Node<V> = pager.read_node(node.child(index + 1)?)?;
        if right.has_spare_key() {
            let (succ_key, succ_value) = Self::leftmost_entry(pager, &right)?;
            node.keys[index] = succ_key.clone();
            node.values[index] = succ_value;
            pager.write_node(node)?;
            return Self::delete_from(pager, &mut right, &succ_key);
        }

        let key = node.keys[index].clone();
        Self::merge_children(pager, node, index, &mut left, right)?;
        Self::delete_from(pager, &mut left, &key)
    }

    /// Load `node.children[index]`, topping it up to at least `t` keys
    ///
    /// Returns the node the descent should continue into (after a merge
    /// with the left sibling that is the left sibling).
    fn prepare_child(pager: &mut Pager, node: &mut Node<V>, index: usize) -> Result<Node<V>> {
        let mut child: Node<V> = pager.read_node(node.child(index)?)?;
        if child.has_spare_key() {
            return Ok(child);
        }

        let mut left: Option<Node<V>> = None;
        if index > 0 {
            let mut sibling: Node<V> = pager.read_node(node.child(index - 1)?)?;
            if sibling.has_spare_key() {
                Self::borrow_from_left(pager, node, index, &mut sibling, &mut child)?;
                return Ok(child);
            }
            left = Some(sibling);
        }

        if index < node.keys.len() {
            let mut sibling: Node<V> = pager.read_node(node.child(index + 1)?)?;
            if sibling.has_spare_key() {
                Self::borrow_from_right(pager, node, index, &mut child, &mut sibling)?;
                return Ok(child);
            }
            Self::merge_children(pager, node, index, &mut child, sibling)?;
            return Ok(child);
        }

        match left {
            Some(mut sibling) => {
                Self::merge_children(pager, node, index - 1, &mut sibling, child)?;
                Ok(sibling)
            }
            None => Err(VaultError::IndexCorruption(format!(
                "internal node at {} has no keys",
                node.offset
            ))),
        }
    }

    /// Rotate one entry from the left sibling through the parent into `child`
    fn borrow_from_left(
        pager: &mut Pager,
        parent: &mut Node<V>,
        index: usize,
        left: &mut Node<V>,
        child: &mut Node<V>,
    ) -> Result<()> {
        let (Some(key), Some(value)) = (left.keys.pop(), left.values.pop()) else {
            return Err(VaultError::IndexCorruption(format!(
                "borrow from empty node at {}",
                left.offset
            )));
        };

        let separator_key = std::mem::replace(&mut parent.keys[index - 1], key);
        let separator_value = std::mem::replace(&mut parent.values[index - 1], value);
        child.keys.insert(0, separator_key);
        child.values.insert(0, separator_value);

        if !child.leaf {
            let moved = left.children.pop().ok_or_else(|| {
                VaultError::IndexCorruption(format!("internal node at {} has no children", left.offset))
            })?;
            child.children.insert(0, moved);
        }

        pager.write_node(left)?;
        pager.write_node(child)?;
        pager.write_node(parent)
    }

    /// Rotate one entry from the right sibling through the parent into `child`
    fn borrow_from_right(
        pager: &mut Pager,
        parent: &mut Node<V>,
        index: usize,
        child: &mut Node<V>,
        right: &mut Node<V>,
    ) -> Result<()> {
        let key = right.keys.remove(0);
        let value = right.values.remove(0);

        let separator_key = std::mem::replace(&mut parent.keys[index], key);
        let separator_value = std::mem::replace(&mut parent.values[index], value);
        child.keys.push(separator_key);
        child.values.push(separator_value);

        if !child.leaf {
            child.children.push(right.children.remove(0));
        }

        pager.write_node(right)?;
        pager.write_node(child)?;
        pager.write_node(parent)
    }

    /// Fold `parent.keys[index]` and `right` into `left`; frees `right`'s page
    fn merge_children(
        pager: &mut Pager,
        parent: &mut Node<V>,
        index: usize,
        left: &mut Node<V>,
        right: Node<V>,
    ) -> Result<()> {
        left.keys.push(parent.keys.remove(index));
        left.values.push(parent.values.remove(index));
        parent.children.remove(index + 1);

        left.keys.extend(right.keys);
        left.values.extend(right.values);
        left.children.extend(right.children);

        pager.write_node(left)?;
        pager.release(right.offset);
        pager.write_node(parent)
    }

    fn rightmost_entry(pager: &Pager, node: &Node<V>) -> Result<(ByteKey, V)> {
        if node.leaf {
            return node.last_entry();
        }
        let mut current: Node<V> = pager.read_node(node.child(node.keys.len())?)?;
        while !current.leaf {
            current = pager.read_node(current.child(current.keys.len())?)?;
        }
        current.last_entry()
    }

    fn leftmost_entry(pager: &Pager, node: &Node<V>) -> Result<(ByteKey, V)> {
        if node.leaf {
            return node.first_entry();
        }
        let mut current: Node<V> = pager.read_node(node.child(0)?)?;
        while !current.leaf {
            current = pager.read_node(current.child(0)?)?;
        }
        current.first_entry()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Every page offset reachable from the root
    fn reachable_pages(pager: &Pager) -> Result<HashSet<u64>> {
        let mut seen = HashSet::new();
        let mut stack = vec![ROOT_OFFSET];

        while let Some(offset) = stack.pop() {
            if !seen.insert(offset) {
                return Err(VaultError::IndexCorruption(format!(
                    "page at {} referenced twice",
                    offset
                )));
            }
            let node: Node<V> = pager.read_node(offset)?;
            stack.extend(node.children.iter().copied());
        }

        Ok(seen)
    }

    /// Force written pages to disk
    pub fn sync(&self) -> Result<()> {
        self.pager.read().sync()
    }

    /// Path of the index file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
