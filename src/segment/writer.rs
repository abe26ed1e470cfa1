//! Segment Writer
//!
//! Writes a fresh segment file sequentially (used for compaction output).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};
use crate::record::Record;

/// Buffered writer for a new segment
pub struct SegmentWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Bytes written so far (next frame offset)
    position: u64,
    records: u64,
}

impl SegmentWriter {
    /// Create the file; fails if something already exists at `path`
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(VaultError::segment_io(path))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            position: 0,
            records: 0,
        })
    }

    /// Append one framed record; returns the absolute offset of its value
    pub fn append(&mut self, record: &Record) -> Result<u64> {
        let frame = record.encode_frame();
        self.writer
            .write_all(&frame)
            .map_err(VaultError::segment_io(&self.path))?;

        let value_offset = self.position + record.value_offset_in_frame();
        self.position += frame.len() as u64;
        self.records += 1;
        Ok(value_offset)
    }

    /// Flush and fsync; returns the final file size
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .map_err(VaultError::segment_io(&self.path))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(VaultError::segment_io(&self.path))?;
        Ok(self.position)
    }

    /// Records appended so far
    pub fn records(&self) -> u64 {
        self.records
    }
}
