//! Archival metadata for recovered tape images
//!
//! Produces the BitStore metadata document that accompanies each `.TAP`
//! file in the archive: fixed catalogue fields, a best-effort reading of the
//! tape header record (label and file directory), and one line per record
//! summarising its length, contents and defects.

use crate::framing::{Record, TapeEntry, TapeImage};
use std::fmt::Write;

/// Catalogue keyword for these tapes
pub const KEYWORD: &str = "COMPANY/ICL/COMET/TAPE";

/// Physical medium
pub const MEDIA_TYPE: &str = "Mini-Cassette";

/// Offset of the volume label in the header record
const LABEL_OFFSET: usize = 4;
/// Length of the volume label
const LABEL_LEN: usize = 50;
/// Bytes between the label and the first directory entry
const LABEL_TRAILER: usize = 13;
/// Length of one directory entry
const ENTRY_LEN: usize = 26;
/// Entry plus checksum and postamble, which must still fit in the record
const ENTRY_SPAN: usize = ENTRY_LEN + 3;

/// Interpreted tape header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeHeader {
    /// Volume label
    pub label: String,
    /// Directory entries as `NAME.EXT`
    pub files: Vec<String>,
}

impl TapeHeader {
    /// Interpret the first record of a tape as a volume header
    ///
    /// The checksum is not consulted: a damaged header is still worth
    /// reading. Returns `None` when the record does not look like a header.
    pub fn parse(head: &[u8]) -> Option<Self> {
        if head.len() < LABEL_OFFSET + LABEL_LEN || head[..3] != [0xAA, 0x00, 0x00] {
            return None;
        }

        let label = ascii(&head[LABEL_OFFSET..LABEL_OFFSET + LABEL_LEN])
            .unwrap_or_else(|| String::from_utf8_lossy(&head[LABEL_OFFSET..LABEL_OFFSET + LABEL_LEN]).into_owned());
        let label = label.trim_end().to_string();

        let mut files = Vec::new();
        let mut index = LABEL_OFFSET + LABEL_LEN + LABEL_TRAILER;
        while index + ENTRY_SPAN <= head.len() && (0x21..0x6e).contains(&head[index]) {
            let name = ascii(&head[index..index + 10]);
            let extension = ascii(&head[index + 10..index + 13]);
            match (name, extension) {
                (Some(name), Some(extension)) => {
                    files.push(format!("{}.{}", name.trim_end(), extension.trim_end()));
                }
                _ => {
                    log::debug!("Non-ASCII directory entry at header offset {}", index);
                    break;
                }
            }
            index += ENTRY_LEN;
        }

        Some(Self { label, files })
    }

    /// Description lines, national characters already mapped
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec!["Tape label:".to_string(), format!("\t{}", ds2089(&self.label))];
        lines.push("File list:".to_string());
        lines.extend(self.files.iter().map(|f| format!("\t{}", ds2089(f))));
        lines
    }
}

fn ascii(bytes: &[u8]) -> Option<String> {
    if bytes.is_ascii() {
        Some(bytes.iter().map(|&b| b as char).collect())
    } else {
        None
    }
}

/// Map the DS 2089 national variant of ASCII to Unicode
///
/// # Example
///
/// ```
/// use comet_tape::analysis::metadata::ds2089;
///
/// assert_eq!(ds2089("K{BENHAVN"), "KæBENHAVN");
/// ```
pub fn ds2089(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '[' => 'Æ',
            '\\' => 'Ø',
            ']' => 'Å',
            '{' => 'æ',
            '|' => 'ø',
            '}' => 'å',
            other => other,
        })
        .collect()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

/// One-line summary of a record
///
/// Length, the contents (abbreviated to the first and last four octets for
/// records longer than eight), then the defect flags.
pub fn record_report(record: &Record) -> String {
    let bytes = &record.bytes;
    let contents = if bytes.len() <= 8 {
        hex(bytes)
    } else {
        format!("{}…{}", hex(&bytes[..4]), hex(&bytes[bytes.len() - 4..]))
    };
    let mut text = format!("{:5} bytes [{}]", bytes.len(), contents);
    for flag in &record.flags {
        text.push(' ');
        text.push_str(flag.label());
    }
    text
}

/// Render the BitStore metadata document for an image
///
/// # Arguments
///
/// * `tap_filename` - File name of the `.TAP` image (no directory)
/// * `image` - The recovered image
pub fn bitstore_metadata(tap_filename: &str, image: &TapeImage) -> String {
    let mut doc = String::new();
    let fields = [
        ("BitStore.Metadata_version", "1.0"),
        ("BitStore.Filename", tap_filename),
        ("BitStore.Format", "SIMH-TAP"),
        ("BitStore.Access", "public"),
        ("BitStore.Last_edit", "YYYYMMDD NN"),
        ("DDHF.Keyword", KEYWORD),
        ("Media.Summary", "XXX"),
        ("Media.Type", MEDIA_TYPE),
    ];
    for (key, value) in fields {
        let _ = write!(doc, "{}:\n\t{}\n\n", key, value);
    }

    doc.push_str("Media.Description:\n");
    if let Some(header) = image.records().next().and_then(|r| TapeHeader::parse(&r.bytes)) {
        for line in header.lines() {
            let _ = writeln!(doc, "\t{}", line);
        }
    }
    doc.push_str("\tTape Records:\n");
    for entry in &image.entries {
        match entry {
            TapeEntry::Record(record) => {
                let _ = writeln!(doc, "\t\t{}", record_report(record));
            }
            TapeEntry::TapeMark { .. } => doc.push_str("\t\tTape mark\n"),
        }
    }
    doc.push_str("\n*END*\n");
    doc
}
