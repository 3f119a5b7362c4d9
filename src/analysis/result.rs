//! Decode result types

use super::arbiter::ChannelReport;
use crate::framing::{AssemblyStats, TapeImage};
use crate::signal::DecodeStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete result of decoding one capture
#[derive(Debug, Clone)]
pub struct DecodeResult {
    /// Recovered tape image
    pub image: TapeImage,

    /// Index of the channel the image was assembled from
    pub selected_channel: usize,

    /// Survey of every channel, in channel order
    pub channels: Vec<ChannelReport>,

    /// Decode counters of the assembly pass on the selected channel
    pub decode: DecodeStats,

    /// Frame assembly counters
    pub assembly: AssemblyStats,
}

impl DecodeResult {
    /// Decode quality of the selected channel (0.0-1.0)
    pub fn quality(&self) -> f32 {
        self.decode.quality()
    }

    /// Condensed summary
    pub fn summary(&self) -> TapeSummary {
        TapeSummary {
            records: self.assembly.records,
            invalid_records: self.assembly.invalid_records,
            tape_marks: self.assembly.tape_marks,
            selected_channel: self.selected_channel,
            quality: self.quality(),
        }
    }
}

/// Per-file summary, as printed by the batch tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapeSummary {
    /// Records recovered (valid or not)
    pub records: usize,

    /// Records carrying at least one defect flag
    pub invalid_records: usize,

    /// Tape marks recovered
    pub tape_marks: usize,

    /// Channel the image was taken from
    pub selected_channel: usize,

    /// Decode quality of that channel (0.0-1.0)
    pub quality: f32,
}

/// Outcome of processing one capture file
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    /// Decode result
    pub result: DecodeResult,

    /// Written SIMH-TAP image
    pub tap_path: PathBuf,

    /// Written metadata document, if requested
    pub meta_path: Option<PathBuf>,
}
