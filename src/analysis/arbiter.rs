//! Channel arbitration
//!
//! A capture may hold several channels, of which any (or none) carries the
//! tape data: stereo captures of a mono track, a cable on the wrong pin, a
//! second head reading the other track. Every channel is surveyed
//! independently and the most consistent one is kept.
//!
//! # Selection
//!
//! A channel is usable when it has transitions, produced at least one run of
//! `viable_run_bits` bits that was not ended by a desync, and its decode
//! quality reaches `min_quality`. Damaged stretches cost a channel one desync
//! each, so a good tape with a bad record stays selectable. Among usable channels the highest quality wins;
//! ties go to the channel with more bits in closed runs, then to the lower
//! channel index.
//!
//! # Example
//!
//! ```
//! use comet_tape::analysis::arbiter::{select_channel, survey_channels};
//! use comet_tape::config::DecoderConfig;
//! use comet_tape::synth::TapeSynthesizer;
//!
//! let config = DecoderConfig::default();
//! let tape = TapeSynthesizer::new(&config).gap(10).record(b"DATA").gap(10).render();
//! let channels = vec![vec![0i16; tape.samples.len()], tape.samples];
//!
//! let reports = survey_channels(&channels, &config);
//! assert_eq!(select_channel(&reports).unwrap().channel, 1);
//! ```

use crate::config::DecoderConfig;
use crate::error::TapeError;
use crate::signal::{ChannelDecoder, DecodeStats};
use rayon::prelude::*;
use serde::Serialize;

/// Why a channel was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnusableReason {
    /// No transitions at all
    Silent,
    /// Scan gave up without ever finding framed data
    Abandoned,
    /// No run long enough to be a record
    NoFramedRun,
    /// Too many transitions that fit no bit timing
    LowQuality,
}

/// Outcome of a channel survey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelVerdict {
    /// Candidate for selection
    Usable,
    /// Rejected
    Unusable(UnusableReason),
}

/// Survey result for one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelReport {
    /// Channel index in the capture
    pub channel: usize,
    /// Decode counters
    pub stats: DecodeStats,
    /// Decode quality (0.0-1.0)
    pub quality: f32,
    /// Verdict
    pub verdict: ChannelVerdict,
}

impl ChannelReport {
    /// Judge a channel from its decode counters
    pub fn assess(channel: usize, stats: DecodeStats, config: &DecoderConfig) -> Self {
        let quality = stats.quality();
        let verdict = if stats.transitions == 0 {
            ChannelVerdict::Unusable(UnusableReason::Silent)
        } else if stats.abandoned {
            ChannelVerdict::Unusable(UnusableReason::Abandoned)
        } else if stats.framed_runs == 0 {
            ChannelVerdict::Unusable(UnusableReason::NoFramedRun)
        } else if quality < config.min_quality {
            ChannelVerdict::Unusable(UnusableReason::LowQuality)
        } else {
            ChannelVerdict::Usable
        };
        Self {
            channel,
            stats,
            quality,
            verdict,
        }
    }

    /// True if the channel may be selected
    pub fn is_usable(&self) -> bool {
        self.verdict == ChannelVerdict::Usable
    }
}

/// Survey every channel in parallel
///
/// # Arguments
///
/// * `channels` - Per-channel samples
/// * `config` - Decoder configuration
///
/// # Returns
///
/// One report per channel, in channel order
pub fn survey_channels(channels: &[Vec<i16>], config: &DecoderConfig) -> Vec<ChannelReport> {
    channels
        .par_iter()
        .enumerate()
        .map(|(index, samples)| {
            let stats = ChannelDecoder::new(samples, config).survey();
            let report = ChannelReport::assess(index, stats, config);
            log::debug!(
                "Channel {}: quality {:.3}, {} framed runs, verdict {:?}",
                index,
                report.quality,
                report.stats.framed_runs,
                report.verdict
            );
            report
        })
        .collect()
}

/// Pick the channel to assemble
///
/// # Errors
///
/// Returns `TapeError::NoValidChannel`, listing every channel's verdict, when
/// no channel is usable
pub fn select_channel(reports: &[ChannelReport]) -> Result<&ChannelReport, TapeError> {
    reports
        .iter()
        .filter(|r| r.is_usable())
        .max_by(|a, b| {
            a.quality
                .total_cmp(&b.quality)
                .then(a.stats.framed_bits.cmp(&b.stats.framed_bits))
                .then(b.channel.cmp(&a.channel))
        })
        .ok_or_else(|| {
            let verdicts: Vec<String> = reports
                .iter()
                .map(|r| format!("channel {}: {:?} (quality {:.2})", r.channel, r.verdict, r.quality))
                .collect();
            TapeError::NoValidChannel(if verdicts.is_empty() {
                "capture has no channels".to_string()
            } else {
                verdicts.join(", ")
            })
        })
}
