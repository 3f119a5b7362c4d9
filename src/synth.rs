//! Synthetic tape captures
//!
//! Builds phase-encoded waveforms the way the drives record them: a bit `0`
//! is a low half-cell followed by a high one (rising transition at mid-cell),
//! a bit `1` the opposite. Inter-record gaps are silence. Tape speed can
//! drift linearly across the capture or jump at a given bit-cell, which is
//! what worn capstans and splices do to real recordings.
//!
//! # Example
//!
//! ```
//! use comet_tape::config::DecoderConfig;
//! use comet_tape::synth::TapeSynthesizer;
//!
//! let config = DecoderConfig::default();
//! let tape = TapeSynthesizer::new(&config)
//!     .gap(10)
//!     .record(b"HELLO")
//!     .gap(10)
//!     .render();
//! assert_eq!(tape.bit_positions.len(), (1 + 5 + 2 + 1) * 8);
//! ```

use crate::config::DecoderConfig;
use crate::framing::crc::append_crc;

#[derive(Debug, Clone)]
enum Segment {
    Bits(Vec<bool>),
    Silence(usize),
}

/// A rendered capture
#[derive(Debug, Clone)]
pub struct SynthesizedTape {
    /// Mono samples
    pub samples: Vec<i16>,
    /// Sample index of the data transition of every bit, in order
    pub bit_positions: Vec<usize>,
}

/// Builder for phase-encoded test captures
#[derive(Debug, Clone)]
pub struct TapeSynthesizer {
    nominal_cell: f64,
    amplitude: i16,
    preamble: u8,
    postamble: u8,
    segments: Vec<Segment>,
    cells: usize,
    drift: f64,
    steps: Vec<(usize, f64)>,
}

impl TapeSynthesizer {
    /// Start an empty capture with the timing and framing of `config`
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            nominal_cell: config.nominal_cell(),
            amplitude: 12000,
            preamble: config.preamble,
            postamble: config.postamble,
            segments: Vec::new(),
            cells: 0,
            drift: 0.0,
            steps: Vec::new(),
        }
    }

    /// Peak amplitude of the square wave (default: 12000)
    pub fn amplitude(mut self, amplitude: i16) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Append `cells` bit-cells of silence
    pub fn gap(mut self, cells: usize) -> Self {
        self.cells += cells;
        self.segments.push(Segment::Silence(cells));
        self
    }

    /// Append a framed record: preamble, payload, checksum, postamble
    pub fn record(self, payload: &[u8]) -> Self {
        let bytes = frame_payload(payload, self.preamble, self.postamble);
        self.raw_bytes(&bytes)
    }

    /// Append a tape mark burst
    pub fn tape_mark(self) -> Self {
        let bytes = [self.preamble, self.postamble];
        self.raw_bytes(&bytes)
    }

    /// Append octets without framing, least significant bit first
    pub fn raw_bytes(self, bytes: &[u8]) -> Self {
        let bits = bytes
            .iter()
            .flat_map(|&byte| (0..8).map(move |i| (byte >> i) & 1 == 1))
            .collect();
        self.raw_bits(bits)
    }

    /// Append individual bits
    pub fn raw_bits(mut self, bits: Vec<bool>) -> Self {
        self.cells += bits.len();
        self.segments.push(Segment::Bits(bits));
        self
    }

    /// Stretch cells linearly so the last one is `1 + fraction` times nominal
    pub fn drift(mut self, fraction: f64) -> Self {
        self.drift = fraction;
        self
    }

    /// Multiply the length of every cell from `cell` onward by `factor`
    pub fn speed_step(mut self, cell: usize, factor: f64) -> Self {
        self.steps.push((cell, factor));
        self
    }

    /// Bit-cells appended so far (bits and silence)
    pub fn cell_count(&self) -> usize {
        self.cells
    }

    fn cell_length(&self, index: usize) -> f64 {
        let progress = if self.cells > 1 {
            index as f64 / (self.cells - 1) as f64
        } else {
            0.0
        };
        let stepped: f64 = self
            .steps
            .iter()
            .filter(|(at, _)| index >= *at)
            .map(|(_, factor)| factor)
            .product();
        self.nominal_cell * (1.0 + self.drift * progress) * stepped
    }

    /// Render the capture
    pub fn render(&self) -> SynthesizedTape {
        let mut samples = Vec::new();
        let mut bit_positions = Vec::new();
        let mut time = 0.0f64;
        let mut index = 0usize;

        for segment in &self.segments {
            match segment {
                Segment::Silence(cells) => {
                    for _ in 0..*cells {
                        time += self.cell_length(index);
                        index += 1;
                    }
                    samples.resize(time.round() as usize, 0);
                }
                Segment::Bits(bits) => {
                    for &bit in bits {
                        let length = self.cell_length(index);
                        let middle = (time + length / 2.0).round() as usize;
                        let end = (time + length).round() as usize;
                        let (first, second) = if bit {
                            (self.amplitude, -self.amplitude)
                        } else {
                            (-self.amplitude, self.amplitude)
                        };
                        samples.resize(middle, first);
                        samples.resize(end, second);
                        bit_positions.push(middle);
                        time += length;
                        index += 1;
                    }
                }
            }
        }

        SynthesizedTape {
            samples,
            bit_positions,
        }
    }
}

/// Frame a payload the way the drives write it
///
/// Returns `preamble | payload | CRC-16 (little-endian) | postamble`
pub fn frame_payload(payload: &[u8], preamble: u8, postamble: u8) -> Vec<u8> {
    let mut body = payload.to_vec();
    append_crc(&mut body);
    let mut bytes = Vec::with_capacity(body.len() + 2);
    bytes.push(preamble);
    bytes.extend(body);
    bytes.push(postamble);
    bytes
}
