//! Configuration parameters for tape signal recovery

use crate::error::TapeError;
use serde::{Deserialize, Serialize};

/// Decoder configuration parameters
///
/// The defaults reproduce the timing and framing conventions of the
/// cassette drives the captures come from. Every field can be overridden from
/// a partial JSON document (missing fields keep their default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    // Input
    /// Expected sample rate in Hz (default: 44100)
    pub sample_rate: u32,

    // Threshold
    /// Absolute noise floor for transition detection (default: 2500)
    /// Samples whose magnitude stays below this never produce a transition
    pub threshold_floor: i16,

    /// Fraction of the rolling peak envelope used as threshold (default: 0.3)
    pub threshold_ratio: f32,

    /// Envelope half-life in samples (default: 2205, 50 ms at 44.1 kHz)
    pub envelope_half_life: usize,

    // Timing recovery
    /// A-priori bit rate in bits per second (default: 225.0)
    pub nominal_bit_rate: f64,

    /// Bit-cell estimate averaging divisor (default: 2.0)
    /// Each accepted interval moves the estimate by `(d - T) / pll_divisor`
    pub pll_divisor: f64,

    /// Intervals shorter than this many bit-cells are boundary transitions (default: 0.72)
    pub edge_factor: f64,

    /// Longest interval, in bit-cells, still accepted as one data bit (default: 1.5)
    pub max_cell_factor: f64,

    /// Silence longer than this many bit-cells is an inter-record gap (default: 4.0)
    pub gap_factor: f64,

    /// Bits accepted unconditionally while acquiring lock at the start of a run (default: 8)
    pub acquisition_bits: usize,

    /// Abandon a channel that has produced no framed run after this many
    /// samples without lock (default: 20 s)
    /// `None` always scans to the end of the channel
    pub max_unsynced_span: Option<usize>,

    // Framing
    /// Synchronisation octet opening every record (default: 0xAA)
    pub preamble: u8,

    /// Synchronisation octet closing every record (default: 0xAA)
    pub postamble: u8,

    /// Bursts shorter than this are treated as noise (default: 48)
    pub min_record_bits: usize,

    // Channel selection
    /// Minimum decode quality for a channel to be considered (default: 0.6)
    pub min_quality: f32,

    /// Shortest run, not ended by a desync, that proves a channel carries
    /// framed data (default: 16)
    pub viable_run_bits: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            threshold_floor: 2500,
            threshold_ratio: 0.3,
            envelope_half_life: 2205,
            nominal_bit_rate: (300.0 + 150.0) / 2.0,
            pll_divisor: 2.0,
            edge_factor: 0.72,
            max_cell_factor: 1.5,
            gap_factor: 4.0,
            acquisition_bits: 8,
            max_unsynced_span: Some(20 * 44100),
            preamble: 0xAA,
            postamble: 0xAA,
            min_record_bits: 48,
            min_quality: 0.6,
            viable_run_bits: 16,
        }
    }
}

impl DecoderConfig {
    /// Nominal bit-cell duration in samples
    pub fn nominal_cell(&self) -> f64 {
        self.sample_rate as f64 / self.nominal_bit_rate
    }

    /// Parse a (possibly partial) JSON configuration document
    ///
    /// # Errors
    ///
    /// Returns `TapeError::InvalidInput` if the document is malformed or the
    /// resulting configuration fails [`DecoderConfig::validate`].
    pub fn from_json(text: &str) -> Result<Self, TapeError> {
        let config: DecoderConfig = serde_json::from_str(text)
            .map_err(|e| TapeError::InvalidInput(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the parameters are mutually consistent
    ///
    /// # Errors
    ///
    /// Returns `TapeError::InvalidInput` naming the first offending parameter
    pub fn validate(&self) -> Result<(), TapeError> {
        if self.sample_rate == 0 {
            return Err(TapeError::InvalidInput("sample_rate must be > 0".to_string()));
        }
        if !(self.nominal_bit_rate > 0.0) || self.nominal_cell() < 4.0 {
            return Err(TapeError::InvalidInput(format!(
                "nominal_bit_rate {} leaves fewer than 4 samples per bit-cell",
                self.nominal_bit_rate
            )));
        }
        if !(0.0..1.0).contains(&self.threshold_ratio) {
            return Err(TapeError::InvalidInput(format!(
                "threshold_ratio must be in [0.0, 1.0), got {}",
                self.threshold_ratio
            )));
        }
        if self.threshold_floor <= 0 {
            return Err(TapeError::InvalidInput("threshold_floor must be > 0".to_string()));
        }
        if self.envelope_half_life == 0 {
            return Err(TapeError::InvalidInput("envelope_half_life must be > 0".to_string()));
        }
        if self.pll_divisor < 1.0 {
            return Err(TapeError::InvalidInput(format!(
                "pll_divisor must be >= 1.0, got {}",
                self.pll_divisor
            )));
        }
        if !(0.5 < self.edge_factor && self.edge_factor < 1.0) {
            return Err(TapeError::InvalidInput(format!(
                "edge_factor must lie between half a cell and a full cell, got {}",
                self.edge_factor
            )));
        }
        if !(1.0 < self.max_cell_factor && self.max_cell_factor < self.gap_factor) {
            return Err(TapeError::InvalidInput(format!(
                "expected 1.0 < max_cell_factor ({}) < gap_factor ({})",
                self.max_cell_factor, self.gap_factor
            )));
        }
        if self.min_record_bits < 16 || self.viable_run_bits == 0 {
            return Err(TapeError::InvalidInput(
                "min_record_bits must cover at least preamble and postamble".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_quality) {
            return Err(TapeError::InvalidInput(format!(
                "min_quality must be in [0.0, 1.0], got {}",
                self.min_quality
            )));
        }
        Ok(())
    }
}
