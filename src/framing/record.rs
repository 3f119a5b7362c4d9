//! Recovered records and the tape image they form

use serde::Serialize;

/// Defect found in a recovered record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordFlag {
    /// First octet is not the preamble
    BadPreamble,
    /// Last octet is not the postamble
    BadPostamble,
    /// Checksum mismatch, or record too short to hold a checksum
    BadCrc,
    /// Bit timing was lost inside the record
    Desync,
    /// Capture ended inside the record
    Unterminated,
}

impl RecordFlag {
    /// Name used in archival record listings
    pub fn label(&self) -> &'static str {
        match self {
            RecordFlag::BadPreamble => "Bad_preamble",
            RecordFlag::BadPostamble => "Bad_postamble",
            RecordFlag::BadCrc => "Bad_CRC",
            RecordFlag::Desync => "Desync",
            RecordFlag::Unterminated => "Unterminated",
        }
    }
}

/// One physical record as read from tape
///
/// `bytes` holds every recovered octet, including preamble, checksum and
/// postamble. A record with an empty flag list is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Recovered octets
    pub bytes: Vec<u8>,
    /// Bits the octets were packed from
    pub bit_count: usize,
    /// Sample index of the first bit cell
    pub start: usize,
    /// Sample index of the last data transition
    pub end: usize,
    /// Defects found
    pub flags: Vec<RecordFlag>,
}

impl Record {
    /// True if no defect was found
    pub fn is_valid(&self) -> bool {
        self.flags.is_empty()
    }

    /// True if `flag` was raised
    pub fn has_flag(&self, flag: RecordFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Data between preamble and checksum
    ///
    /// Empty when the record is too short to have any.
    pub fn payload(&self) -> &[u8] {
        if self.bytes.len() < 4 {
            return &[];
        }
        &self.bytes[1..self.bytes.len() - 3]
    }
}

/// Logical element of a tape image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapeEntry {
    /// A data record (possibly flagged)
    Record(Record),
    /// Zero-length file separator
    TapeMark {
        /// Sample index of the mark
        position: usize,
    },
}

impl TapeEntry {
    /// Sample index where the entry starts
    pub fn position(&self) -> usize {
        match self {
            TapeEntry::Record(record) => record.start,
            TapeEntry::TapeMark { position } => *position,
        }
    }
}

/// Ordered contents of one tape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapeImage {
    /// Entries in the order they were read
    pub entries: Vec<TapeEntry>,
}

impl TapeImage {
    /// Iterate over the data records
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().filter_map(|entry| match entry {
            TapeEntry::Record(record) => Some(record),
            TapeEntry::TapeMark { .. } => None,
        })
    }

    /// Number of tape marks
    pub fn tape_marks(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, TapeEntry::TapeMark { .. }))
            .count()
    }

    /// True if the image holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
