//! Frame assembly: symbol stream to tape entries
//!
//! Records are separated by gaps. The assembler waits for the first gap
//! (anything before it belongs to a record the capture started in the middle
//! of), collects the bits of each burst, packs them into octets and checks
//! the framing. Malformed records are kept and flagged, short noise bursts
//! are dropped, and a preamble immediately followed by a postamble is a tape
//! mark.

use super::crc::crc16;
use super::record::{Record, RecordFlag, TapeEntry, TapeImage};
use crate::config::DecoderConfig;
use crate::signal::{Bit, Symbol};
use serde::Serialize;

/// Bits collected before a burst counts as synchronised
pub const SYNC_BITS: usize = 8;

/// Assembler state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerState {
    /// Waiting for the first gap
    SeekingGap,
    /// After a gap, collecting the first octet of a burst
    ///
    /// The octet is taken whatever its value; a wrong preamble is reported
    /// as a flag on the record rather than searched past.
    CollectingSync {
        /// Bits of the burst so far
        bits: Vec<Bit>,
    },
    /// Inside a record
    InRecord {
        /// Bits of the record so far
        bits: Vec<Bit>,
    },
}

/// How a burst ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Gap,
    Desync,
    EndOfSignal,
}

/// Assembly counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyStats {
    /// Records emitted
    pub records: usize,
    /// Records emitted with at least one flag
    pub invalid_records: usize,
    /// Tape marks emitted
    pub tape_marks: usize,
    /// Bursts dropped as too short
    pub noise_bursts: usize,
    /// Bits seen before the first gap
    pub leading_bits_skipped: usize,
}

/// Incremental frame assembler
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    state: AssemblerState,
    preamble: u8,
    postamble: u8,
    min_record_bits: usize,
    entries: Vec<TapeEntry>,
    stats: AssemblyStats,
}

impl FrameAssembler {
    /// Create an assembler using the framing parameters of `config`
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            state: AssemblerState::SeekingGap,
            preamble: config.preamble,
            postamble: config.postamble,
            min_record_bits: config.min_record_bits,
            entries: Vec::new(),
            stats: AssemblyStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> &AssemblerState {
        &self.state
    }

    /// Feed one symbol
    pub fn push(&mut self, symbol: Symbol) {
        let state = std::mem::replace(&mut self.state, AssemblerState::SeekingGap);
        self.state = match (state, symbol) {
            (AssemblerState::SeekingGap, Symbol::Bit(_)) => {
                self.stats.leading_bits_skipped += 1;
                AssemblerState::SeekingGap
            }
            (AssemblerState::SeekingGap, Symbol::Gap { .. }) => {
                AssemblerState::CollectingSync { bits: Vec::new() }
            }
            (AssemblerState::SeekingGap, _) => AssemblerState::SeekingGap,

            (AssemblerState::CollectingSync { mut bits }, Symbol::Bit(bit)) => {
                bits.push(bit);
                if bits.len() == SYNC_BITS {
                    let octet = pack_bits(&bits)[0];
                    if octet != self.preamble {
                        log::debug!(
                            "Burst at sample {} opens with {:#04x}, expected preamble {:#04x}",
                            bits[0].start,
                            octet,
                            self.preamble
                        );
                    }
                    AssemblerState::InRecord { bits }
                } else {
                    AssemblerState::CollectingSync { bits }
                }
            }
            (AssemblerState::InRecord { mut bits }, Symbol::Bit(bit)) => {
                bits.push(bit);
                AssemblerState::InRecord { bits }
            }

            (AssemblerState::CollectingSync { bits }, Symbol::Gap { .. })
            | (AssemblerState::InRecord { bits }, Symbol::Gap { .. }) => {
                self.close(bits, Termination::Gap);
                AssemblerState::CollectingSync { bits: Vec::new() }
            }
            (AssemblerState::CollectingSync { bits }, Symbol::Desync { .. })
            | (AssemblerState::InRecord { bits }, Symbol::Desync { .. }) => {
                self.close(bits, Termination::Desync);
                AssemblerState::SeekingGap
            }
            (AssemblerState::CollectingSync { bits }, Symbol::EndOfSignal { .. })
            | (AssemblerState::InRecord { bits }, Symbol::EndOfSignal { .. }) => {
                self.close(bits, Termination::EndOfSignal);
                AssemblerState::SeekingGap
            }
        };
    }

    /// Close any open burst and return the image and counters
    pub fn finish(mut self) -> (TapeImage, AssemblyStats) {
        self.push(Symbol::EndOfSignal { position: 0 });
        log::debug!(
            "Assembled {} records ({} invalid), {} tape marks, {} noise bursts",
            self.stats.records,
            self.stats.invalid_records,
            self.stats.tape_marks,
            self.stats.noise_bursts
        );
        (
            TapeImage {
                entries: self.entries,
            },
            self.stats,
        )
    }

    fn close(&mut self, bits: Vec<Bit>, termination: Termination) {
        let (first, last) = match (bits.first(), bits.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return,
        };

        let mut bytes = pack_bits(&bits);
        if bytes.len() > 1 && bytes.last() == Some(&0x00) {
            bytes.pop();
        }

        if bits.len() < self.min_record_bits {
            if termination == Termination::Gap && bytes == [self.preamble, self.postamble] {
                self.stats.tape_marks += 1;
                self.entries.push(TapeEntry::TapeMark {
                    position: first.start,
                });
            } else {
                log::debug!(
                    "Dropping {}-bit noise burst at sample {}",
                    bits.len(),
                    first.start
                );
                self.stats.noise_bursts += 1;
            }
            return;
        }

        let mut flags = self.check_framing(&bytes);
        match termination {
            Termination::Gap => {}
            Termination::Desync => flags.push(RecordFlag::Desync),
            Termination::EndOfSignal => flags.push(RecordFlag::Unterminated),
        }

        self.stats.records += 1;
        if !flags.is_empty() {
            self.stats.invalid_records += 1;
            log::debug!(
                "Record of {} bytes at sample {} flagged {:?}",
                bytes.len(),
                first.start,
                flags
            );
        }
        self.entries.push(TapeEntry::Record(Record {
            bytes,
            bit_count: bits.len(),
            start: first.start,
            end: last.end,
            flags,
        }));
    }

    fn check_framing(&self, bytes: &[u8]) -> Vec<RecordFlag> {
        let mut flags = Vec::new();
        if bytes.first() != Some(&self.preamble) {
            flags.push(RecordFlag::BadPreamble);
        }
        if bytes.last() != Some(&self.postamble) {
            flags.push(RecordFlag::BadPostamble);
        }
        // preamble + checksum + postamble
        if bytes.len() < 4 || crc16(&bytes[1..bytes.len() - 1]) != 0 {
            flags.push(RecordFlag::BadCrc);
        }
        flags
    }
}

/// Pack bits into octets, first bit in the least significant position
///
/// A trailing partial octet keeps the bits available.
pub fn pack_bits(bits: &[Bit]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |octet, (i, bit)| octet | ((bit.value as u8) << i))
        })
        .collect()
}

/// Assemble a complete symbol stream
///
/// # Arguments
///
/// * `symbols` - Decoder output for one channel
/// * `config` - Framing parameters
///
/// # Returns
///
/// The tape image and assembly counters
pub fn assemble<I>(symbols: I, config: &DecoderConfig) -> (TapeImage, AssemblyStats)
where
    I: IntoIterator<Item = Symbol>,
{
    let mut assembler = FrameAssembler::new(config);
    for symbol in symbols {
        assembler.push(symbol);
    }
    assembler.finish()
}
