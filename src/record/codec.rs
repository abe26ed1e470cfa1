//! Record Codec
//!
//! Encodes and decodes a single record to and from its fixed layout.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, VaultError};

use super::{current_timestamp, is_tombstone, FRAME_HEADER_SIZE, RECORD_HEADER_SIZE, TOMBSTONE};

/// A single key/value write as stored in a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Creation time (unix millis)
    pub timestamp: u64,
    /// Raw key bytes
    pub key: Bytes,
    /// Raw value bytes, or the tombstone marker
    pub value: Bytes,
}

impl Record {
    /// Create a record stamped with the current time
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::with_timestamp(current_timestamp(), key, value)
    }

    /// Create a record with an explicit timestamp (used when compacting)
    pub fn with_timestamp(timestamp: u64, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a tombstone record for a key
    pub fn tombstone(key: impl Into<Bytes>) -> Self {
        Self::new(key, Bytes::from_static(TOMBSTONE))
    }

    pub fn is_tombstone(&self) -> bool {
        is_tombstone(&self.value)
    }

    pub fn key_size(&self) -> u32 {
        self.key.len() as u32
    }

    pub fn value_size(&self) -> u32 {
        self.value.len() as u32
    }

    /// Length of the encoded record (without the frame prefix)
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE as usize + self.key.len() + self.value.len()
    }

    /// Byte distance from the start of a frame to the first value byte
    pub fn value_offset_in_frame(&self) -> u64 {
        FRAME_HEADER_SIZE + RECORD_HEADER_SIZE + self.key.len() as u64
    }

    /// Serialize as `timestamp || keySize || valueSize || key || value`
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.put_record(&mut buf);
        buf.freeze()
    }

    /// Serialize with the 4-byte length prefix used on disk
    pub fn encode_frame(&self) -> Bytes {
        let len = self.encoded_len();
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE as usize + len);
        buf.put_u32(len as u32);
        self.put_record(&mut buf);
        buf.freeze()
    }

    fn put_record(&self, buf: &mut BytesMut) {
        buf.put_u64(self.timestamp);
        buf.put_u32(self.key_size());
        buf.put_u32(self.value_size());
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
    }

    /// Parse an encoded record (without the frame prefix)
    ///
    /// The declared key and value sizes must account for exactly the
    /// bytes that follow the header.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RECORD_HEADER_SIZE as usize {
            return Err(VaultError::MalformedRecord(format!(
                "Incomplete header: expected {} bytes, got {}",
                RECORD_HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let timestamp = buf.get_u64();
        let key_size = buf.get_u32() as usize;
        let value_size = buf.get_u32() as usize;

        let declared = key_size as u64 + value_size as u64;
        if declared != buf.remaining() as u64 {
            return Err(VaultError::MalformedRecord(format!(
                "Declared key size {} + value size {} does not match {} payload bytes",
                key_size,
                value_size,
                buf.remaining()
            )));
        }

        let key = Bytes::copy_from_slice(&buf[..key_size]);
        let value = Bytes::copy_from_slice(&buf[key_size..]);

        Ok(Self {
            timestamp,
            key,
            value,
        })
    }
}
