//! SIMH-TAP image writer
//!
//! Each record is written as a 32-bit little-endian length, the data, one
//! pad byte when the length is odd, and the length again. A tape mark is a
//! zero length word and the image ends with the end-of-medium marker.

use super::{END_OF_MEDIUM, MAX_RECORD_LEN, TAPE_MARK};
use crate::error::TapeError;
use crate::framing::{TapeEntry, TapeImage};
use std::io::Write;

/// Streaming SIMH-TAP writer
#[derive(Debug)]
pub struct TapWriter<W: Write> {
    inner: W,
    records: usize,
    tape_marks: usize,
}

impl<W: Write> TapWriter<W> {
    /// Wrap a byte sink
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            records: 0,
            tape_marks: 0,
        }
    }

    /// Write one data record
    ///
    /// # Errors
    ///
    /// Returns `TapeError::InvalidInput` if the record is longer than the
    /// 28-bit length field allows, or `TapeError::IoError` if the sink fails.
    pub fn write_record(&mut self, data: &[u8]) -> Result<(), TapeError> {
        if data.len() > MAX_RECORD_LEN as usize {
            return Err(TapeError::InvalidInput(format!(
                "Record of {} bytes exceeds SIMH-TAP limit of {} bytes",
                data.len(),
                MAX_RECORD_LEN
            )));
        }
        let length = (data.len() as u32).to_le_bytes();
        self.inner.write_all(&length)?;
        self.inner.write_all(data)?;
        if data.len() % 2 == 1 {
            self.inner.write_all(&[0])?;
        }
        self.inner.write_all(&length)?;
        self.records += 1;
        Ok(())
    }

    /// Write a tape mark
    pub fn write_tape_mark(&mut self) -> Result<(), TapeError> {
        self.inner.write_all(&TAPE_MARK.to_le_bytes())?;
        self.tape_marks += 1;
        Ok(())
    }

    /// Write one tape entry
    pub fn write_entry(&mut self, entry: &TapeEntry) -> Result<(), TapeError> {
        match entry {
            TapeEntry::Record(record) => self.write_record(&record.bytes),
            TapeEntry::TapeMark { .. } => self.write_tape_mark(),
        }
    }

    /// Write the end-of-medium marker, flush, and return the sink
    pub fn finish(mut self) -> Result<W, TapeError> {
        self.inner.write_all(&END_OF_MEDIUM.to_le_bytes())?;
        self.inner.flush()?;
        log::debug!(
            "Wrote SIMH-TAP image: {} records, {} tape marks",
            self.records,
            self.tape_marks
        );
        Ok(self.inner)
    }
}

impl TapeImage {
    /// Serialize the whole image, end-of-medium included
    ///
    /// Flagged records are written like any other record.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`TapWriter`].
    pub fn write_tap<W: Write>(&self, sink: W) -> Result<W, TapeError> {
        let mut writer = TapWriter::new(sink);
        for entry in &self.entries {
            writer.write_entry(entry)?;
        }
        writer.finish()
    }

    /// Serialize the whole image into memory
    pub fn to_tap_bytes(&self) -> Result<Vec<u8>, TapeError> {
        self.write_tap(Vec::new())
    }
}
