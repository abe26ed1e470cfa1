//! Segment file handles
//!
//! Random-access handle per segment, shared between the append path and
//! pooled reads.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Result, VaultError};

/// An open segment file
///
/// Seek+read and append both lock the file, so one handle serializes its
/// own I/O while different handles proceed independently.
pub struct SegmentHandle {
    path: PathBuf,
    file: Mutex<File>,
    writable: bool,
}

impl SegmentHandle {
    /// Create a brand-new segment for appending (fails if it exists)
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(path)
            .map_err(VaultError::segment_io(path))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            writable: true,
        })
    }

    /// Open an existing segment for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(VaultError::segment_io(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            writable: false,
        })
    }

    /// Read `len` bytes starting at `offset`
    pub fn read_at(&self, offset: u64, len: u32) -> Result<Bytes> {
        let mut data = vec![0u8; len as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))
                .and_then(|_| file.read_exact(&mut data))
                .map_err(VaultError::segment_io(&self.path))?;
        }
        Ok(Bytes::from(data))
    }

    /// Append bytes with a single write call
    pub fn append(&self, bytes: &[u8]) -> Result<()> {
        self.file
            .lock()
            .write_all(bytes)
            .map_err(VaultError::segment_io(&self.path))
    }

    /// Cut the file back to `len` bytes (drops a partially written frame)
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.file
            .lock()
            .set_len(len)
            .map_err(VaultError::segment_io(&self.path))
    }

    pub fn sync(&self) -> Result<()> {
        self.file
            .lock()
            .sync_data()
            .map_err(VaultError::segment_io(&self.path))
    }

    /// Flush outstanding writes before the handle is dropped
    pub fn close(&self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        self.file
            .lock()
            .sync_all()
            .map_err(|source| VaultError::SegmentDelete {
                path: self.path.clone(),
                source,
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
