//! B-tree nodes and their page encoding
//!
//! ## Page Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ IsLeaf (1) │ NumKeys (4)                                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ [KeyLen (4)][Key][ValueLen (4)][Value]  × NumKeys            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ [ChildOffset (8)]  × (NumKeys + 1)      (internal nodes only) │
//! ├──────────────────────────────────────────────────────────────┤
//! │ zero padding                                                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ CRC32 of everything above (4)                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! Integers are big-endian. Every page is exactly `PAGE_SIZE` bytes.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, VaultError};

use super::ByteKey;

/// Branching order `t`
pub const ORDER: usize = 4;

/// A node holds at most `2t - 1` keys
pub const MAX_KEYS: usize = 2 * ORDER - 1;

/// A non-root node holds at least `t - 1` keys
pub const MIN_KEYS: usize = ORDER - 1;

/// Fixed size of every node page
pub const PAGE_SIZE: usize = 16 * 1024;

/// Largest key accepted by the index
pub const MAX_KEY_SIZE: usize = 1024;

/// Largest serialized value accepted by the index
pub const MAX_VALUE_SIZE: usize = 1024;

const CHECKSUM_SIZE: usize = 4;

/// Offset of the root page
pub const ROOT_OFFSET: u64 = 0;

/// One B-tree node, addressed by the file offset of its page
#[derive(Debug, Clone)]
pub(crate) struct Node<V> {
    pub offset: u64,
    pub leaf: bool,
    pub keys: Vec<ByteKey>,
    pub values: Vec<V>,
    /// Child page offsets (empty for leaves)
    pub children: Vec<u64>,
}

impl<V> Node<V> {
    pub fn new(offset: u64, leaf: bool) -> Self {
        Self {
            offset,
            leaf,
            keys: Vec::with_capacity(MAX_KEYS),
            values: Vec::with_capacity(MAX_KEYS),
            children: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.keys.len() >= MAX_KEYS
    }

    /// Can give up a key and still hold at least `t - 1`
    pub fn has_spare_key(&self) -> bool {
        self.keys.len() > MIN_KEYS
    }

    /// `Ok(i)` for an exact match at slot `i`, `Err(i)` for the child/slot to descend into
    pub fn search(&self, key: &ByteKey) -> std::result::Result<usize, usize> {
        self.keys.binary_search(key)
    }

    pub fn child(&self, index: usize) -> Result<u64> {
        self.children.get(index).copied().ok_or_else(|| {
            VaultError::IndexCorruption(format!(
                "node at {} has no child {}",
                self.offset, index
            ))
        })
    }
}

impl<V: Clone> Node<V> {
    pub fn first_entry(&self) -> Result<(ByteKey, V)> {
        match (self.keys.first(), self.values.first()) {
            (Some(k), Some(v)) => Ok((k.clone(), v.clone())),
            _ => Err(self.empty_node()),
        }
    }

    pub fn last_entry(&self) -> Result<(ByteKey, V)> {
        match (self.keys.last(), self.values.last()) {
            (Some(k), Some(v)) => Ok((k.clone(), v.clone())),
            _ => Err(self.empty_node()),
        }
    }

    fn empty_node(&self) -> VaultError {
        VaultError::IndexCorruption(format!("unexpected empty node at {}", self.offset))
    }
}

impl<V: Serialize + DeserializeOwned> Node<V> {
    /// Encode into one full page with trailing checksum
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(PAGE_SIZE);
        buf.put_u8(self.leaf as u8);
        buf.put_u32(self.keys.len() as u32);

        for (key, value) in self.keys.iter().zip(&self.values) {
            let value_bytes = bincode::serialize(value)?;
            buf.put_u32(key.len() as u32);
            buf.put_slice(key.as_bytes());
            buf.put_u32(value_bytes.len() as u32);
            buf.put_slice(&value_bytes);
        }

        if !self.leaf {
            for child in &self.children {
                buf.put_u64(*child);
            }
        }

        let body_len = PAGE_SIZE - CHECKSUM_SIZE;
        if buf.len() > body_len {
            return Err(VaultError::IndexEntryTooLarge {
                size: buf.len(),
                max: body_len,
            });
        }

        buf.resize(body_len, 0);
        let crc = crc32fast::hash(&buf);
        buf.put_u32(crc);

        Ok(buf.to_vec())
    }

    /// Decode a page read from `offset`
    pub fn decode(offset: u64, page: &[u8]) -> Result<Self> {
        if page.len() != PAGE_SIZE {
            return Err(VaultError::IndexCorruption(format!(
                "page at {} has {} bytes, expected {}",
                offset,
                page.len(),
                PAGE_SIZE
            )));
        }

        let (body, trailer) = page.split_at(PAGE_SIZE - CHECKSUM_SIZE);
        let stored_crc = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if crc32fast::hash(body) != stored_crc {
            return Err(VaultError::IndexCorruption(format!(
                "checksum mismatch for page at {}",
                offset
            )));
        }

        let mut cursor = body;
        let leaf = take(&mut cursor, 1, offset)?[0] != 0;
        let num_keys = u32::from_be_bytes(take_array(&mut cursor, offset)?) as usize;
        if num_keys > MAX_KEYS {
            return Err(VaultError::IndexCorruption(format!(
                "page at {} declares {} keys (max {})",
                offset, num_keys, MAX_KEYS
            )));
        }

        let mut node = Node::new(offset, leaf);
        for _ in 0..num_keys {
            let key_len = u32::from_be_bytes(take_array(&mut cursor, offset)?) as usize;
            let key = ByteKey::from(take(&mut cursor, key_len, offset)?);
            let value_len = u32::from_be_bytes(take_array(&mut cursor, offset)?) as usize;
            let value = bincode::deserialize(take(&mut cursor, value_len, offset)?)?;
            node.keys.push(key);
            node.values.push(value);
        }

        if !leaf {
            for _ in 0..=num_keys {
                node.children.push(u64::from_be_bytes(take_array(&mut cursor, offset)?));
            }
        }

        Ok(node)
    }
}

/// Split `n` bytes off the front of `cursor`
fn take<'a>(cursor: &mut &'a [u8], n: usize, offset: u64) -> Result<&'a [u8]> {
    if cursor.remaining() < n {
        return Err(VaultError::IndexCorruption(format!(
            "page at {} ends early",
            offset
        )));
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head)
}

fn take_array<const N: usize>(cursor: &mut &[u8], offset: u64) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(cursor, N, offset)?);
    Ok(out)
}
