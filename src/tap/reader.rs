//! SIMH-TAP image reader
//!
//! Parses an image back into entries. Used to verify written images and to
//! inspect existing ones.

use super::{END_OF_MEDIUM, MAX_RECORD_LEN, TAPE_MARK};
use crate::error::TapeError;

/// One element of a SIMH-TAP image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapItem {
    /// Data record
    Record(Vec<u8>),
    /// Tape mark
    TapeMark,
    /// End-of-medium marker
    EndOfMedium,
}

/// Iterator over the items of an in-memory image
#[derive(Debug, Clone)]
pub struct TapReader<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> TapReader<'a> {
    /// Read from an image held in memory
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            done: false,
        }
    }

    /// Parse the whole image
    ///
    /// # Errors
    ///
    /// Returns `TapeError::DecodingError` on the first malformed item
    pub fn read_all(data: &'a [u8]) -> Result<Vec<TapItem>, TapeError> {
        TapReader::new(data).collect()
    }

    fn word(&mut self) -> Result<u32, TapeError> {
        let data = self.data;
        let bytes = data
            .get(self.offset..self.offset + 4)
            .ok_or_else(|| self.truncated())?;
        self.offset += 4;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn truncated(&self) -> TapeError {
        TapeError::DecodingError(format!("SIMH-TAP image truncated at offset {}", self.offset))
    }

    fn read_item(&mut self) -> Result<TapItem, TapeError> {
        let start = self.offset;
        let header = self.word()?;
        match header {
            TAPE_MARK => return Ok(TapItem::TapeMark),
            END_OF_MEDIUM => return Ok(TapItem::EndOfMedium),
            _ => {}
        }
        if header > MAX_RECORD_LEN {
            return Err(TapeError::DecodingError(format!(
                "Unsupported record header {:#010x} at offset {}",
                header, start
            )));
        }

        let length = header as usize;
        let padded = length + length % 2;
        let image = self.data;
        let data = image
            .get(self.offset..self.offset + length)
            .ok_or_else(|| self.truncated())?
            .to_vec();
        self.offset += padded;

        let trailer = self.word()?;
        if trailer != header {
            return Err(TapeError::DecodingError(format!(
                "Record at offset {}: leading length {} does not match trailing length {}",
                start, header, trailer
            )));
        }
        Ok(TapItem::Record(data))
    }
}

impl Iterator for TapReader<'_> {
    type Item = Result<TapItem, TapeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.data.len() {
            return None;
        }
        let item = self.read_item();
        if matches!(item, Ok(TapItem::EndOfMedium) | Err(_)) {
            self.done = true;
        }
        Some(item)
    }
}
