//! Record Iterator
//!
//! Sequential iteration over every framed record in a segment file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};

use super::{Record, FRAME_HEADER_SIZE, RECORD_HEADER_SIZE};

/// A record together with where it was found
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    pub record: Record,
    /// Offset of the frame's length prefix
    pub frame_offset: u64,
    /// Absolute offset of the first value byte
    pub value_offset: u64,
}

/// Iterator over the frames of one segment, in file order
///
/// A clean EOF at a frame boundary ends iteration. A truncated frame or
/// an undecodable record yields one `MalformedRecord` error and then
/// iteration stops.
pub struct RecordIterator {
    reader: BufReader<File>,
    path: PathBuf,
    /// File size when the scan started
    len: u64,
    /// Offset of the next frame
    offset: u64,
    done: bool,
}

impl RecordIterator {
    /// Open a segment file for scanning from its first frame
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(VaultError::segment_io(path))?;
        let len = file.metadata().map_err(VaultError::segment_io(path))?.len();
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            len,
            offset: 0,
            done: false,
        })
    }

    /// Offset of the next frame (bytes of valid data consumed so far)
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_frame(&mut self) -> Result<Option<ScannedRecord>> {
        let mut len_buf = [0u8; FRAME_HEADER_SIZE as usize];
        let got = self.fill(&mut len_buf)?;
        if got == 0 {
            return Ok(None);
        }
        if got < len_buf.len() {
            return Err(self.malformed("truncated frame length"));
        }

        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if (frame_len as u64) < RECORD_HEADER_SIZE {
            return Err(self.malformed(&format!("frame length {} below record header", frame_len)));
        }

        // A corrupt length must not drive the allocation below
        let remaining = self.len.saturating_sub(self.offset + FRAME_HEADER_SIZE);
        if frame_len as u64 > remaining {
            return Err(self.malformed(&format!(
                "frame length {} exceeds the {} bytes left in the file",
                frame_len, remaining
            )));
        }

        let mut body = vec![0u8; frame_len];
        if self.fill(&mut body)? < frame_len {
            return Err(self.malformed("truncated frame body"));
        }

        let record = Record::decode(&body)
            .map_err(|e| self.malformed(&e.to_string()))?;

        let frame_offset = self.offset;
        let value_offset = frame_offset + record.value_offset_in_frame();
        self.offset += FRAME_HEADER_SIZE + frame_len as u64;

        Ok(Some(ScannedRecord {
            record,
            frame_offset,
            value_offset,
        }))
    }

    /// Read until `buf` is full or EOF; returns bytes read
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut read = 0;
        while read < buf.len() {
            match self.reader.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(VaultError::segment_io(&self.path)(e)),
            }
        }
        Ok(read)
    }

    fn malformed(&self, detail: &str) -> VaultError {
        VaultError::MalformedRecord(format!(
            "{} at offset {}: {}",
            self.path.display(),
            self.offset,
            detail
        ))
    }
}

impl Iterator for RecordIterator {
    type Item = Result<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.read_frame() {
            Ok(Some(scanned)) => Some(Ok(scanned)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
