//! Channel decoder: samples to a stream of bits, gaps and desyncs
//!
//! A [`ChannelDecoder`] borrows one channel and hands out [`BitStream`]s, lazy
//! iterators of [`Symbol`]s. Streams are independent, so the same channel can
//! be surveyed once for channel selection and scanned again for assembly.

use super::cell::{BitClock, CellLimits, CellPhase, Interval};
use super::transitions::{Polarity, Transition, Transitions};
use crate::config::DecoderConfig;
use serde::Serialize;
use std::collections::VecDeque;

/// One recovered data bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bit {
    /// Bit value (`true` = 1, falling data transition)
    pub value: bool,
    /// Sample index where the cell starts (previous data transition)
    pub start: usize,
    /// Sample index of this bit's data transition
    pub end: usize,
}

/// Decoder output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// A data bit
    Bit(Bit),
    /// Inter-record silence, positioned where the gap threshold was crossed
    Gap {
        /// Sample index
        position: usize,
    },
    /// Bit timing was lost at this transition
    Desync {
        /// Sample index
        position: usize,
    },
    /// End of the channel (or of the scan when it was abandoned)
    EndOfSignal {
        /// Sample index
        position: usize,
    },
}

impl Symbol {
    /// Sample index the symbol is attached to
    pub fn position(&self) -> usize {
        match self {
            Symbol::Bit(bit) => bit.end,
            Symbol::Gap { position }
            | Symbol::Desync { position }
            | Symbol::EndOfSignal { position } => *position,
        }
    }
}

/// Run state of the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No bit timing; waiting for a gap to re-acquire
    Unsynced {
        /// Position of the most recent transition
        last_edge: usize,
        /// Position where timing was lost
        since: usize,
    },
    /// After a gap, waiting for the rising edge that starts a run
    Idle,
    /// Inside a run of bits
    Locked {
        /// Position of the last data transition
        last_data: usize,
        /// Position inside the current cell
        phase: CellPhase,
        /// Bits produced in this run
        bits: usize,
    },
}

/// Per-channel decode counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecodeStats {
    /// Transitions examined
    pub transitions: usize,
    /// Data bits produced
    pub bits: usize,
    /// Cell-boundary transitions
    pub boundaries: usize,
    /// Falling transitions ignored while waiting for a run
    pub leading_edges: usize,
    /// Transitions discarded while unsynchronised
    pub lost: usize,
    /// Runs ended by a timing violation
    pub desyncs: usize,
    /// Gaps detected
    pub gaps: usize,
    /// Runs of at least `viable_run_bits` bits closed by a gap or by the
    /// end of the channel
    pub framed_runs: usize,
    /// Total bits in those runs
    pub framed_bits: usize,
    /// Scan stopped early: a long unsynchronised stretch before any framed run
    pub abandoned: bool,
}

impl DecodeStats {
    /// Fraction of the transitions seen with timing lock that fit the encoding
    ///
    /// Each desync counts as one misfit. Transitions discarded while waiting
    /// for the next gap are not counted, so a long damaged record lowers the
    /// score by one desync rather than by its length.
    ///
    /// # Returns
    ///
    /// Value in [0, 1]; 0 when nothing was decoded
    pub fn quality(&self) -> f32 {
        let explained = self.bits + self.boundaries + self.leading_edges;
        let judged = explained + self.desyncs;
        if judged == 0 {
            return 0.0;
        }
        (explained as f64 / judged as f64) as f32
    }
}

/// Decoder for one channel of a capture
#[derive(Debug, Clone, Copy)]
pub struct ChannelDecoder<'a> {
    samples: &'a [i16],
    config: &'a DecoderConfig,
}

impl<'a> ChannelDecoder<'a> {
    /// Create a decoder over `samples`
    pub fn new(samples: &'a [i16], config: &'a DecoderConfig) -> Self {
        Self { samples, config }
    }

    /// Start a fresh symbol stream from the beginning of the channel
    pub fn symbols(&self) -> BitStream<'a> {
        BitStream::new(self.samples, self.config)
    }

    /// Run a complete scan and return only its statistics
    pub fn survey(&self) -> DecodeStats {
        let mut stream = self.symbols();
        stream.by_ref().for_each(drop);
        stream.into_stats()
    }
}

/// Lazy symbol iterator over one channel
///
/// Always ends with exactly one [`Symbol::EndOfSignal`].
#[derive(Debug, Clone)]
pub struct BitStream<'a> {
    transitions: Transitions<'a>,
    state: DecoderState,
    clock: BitClock,
    limits: CellLimits,
    viable_run_bits: usize,
    max_unsynced_span: Option<usize>,
    pending: VecDeque<Symbol>,
    stats: DecodeStats,
    finished: bool,
}

impl<'a> BitStream<'a> {
    fn new(samples: &'a [i16], config: &DecoderConfig) -> Self {
        Self {
            transitions: Transitions::new(samples, config),
            state: DecoderState::Unsynced {
                last_edge: 0,
                since: 0,
            },
            clock: BitClock::new(config.nominal_cell(), config.pll_divisor),
            limits: CellLimits::from(config),
            viable_run_bits: config.viable_run_bits,
            max_unsynced_span: config.max_unsynced_span,
            pending: VecDeque::with_capacity(2),
            stats: DecodeStats::default(),
            finished: false,
        }
    }

    /// Current run state
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Consume the stream and return its counters
    pub fn into_stats(self) -> DecodeStats {
        self.stats
    }

    fn on_transition(&mut self, t: Transition) {
        self.stats.transitions += 1;

        match self.state {
            DecoderState::Unsynced { last_edge, since } => {
                let gap = self.limits.gap * self.clock.nominal();
                if (t.position - last_edge) as f64 <= gap {
                    self.stats.lost += 1;
                    if let Some(span) = self.max_unsynced_span {
                        if self.stats.framed_runs == 0 && t.position - since > span {
                            self.abandon(t.position);
                            return;
                        }
                    }
                    self.state = DecoderState::Unsynced {
                        last_edge: t.position,
                        since,
                    };
                    return;
                }
                self.emit_gap(last_edge + gap as usize);
                self.state = DecoderState::Idle;
            }
            DecoderState::Locked {
                last_data,
                phase,
                bits,
            } => {
                let interval = (t.position - last_data) as f64;
                let (class, next) = phase.classify(interval, self.clock.cell(), bits, &self.limits);
                match class {
                    Interval::Gap => {
                        self.close_run(last_data, bits);
                        self.state = DecoderState::Idle;
                    }
                    Interval::Boundary => {
                        self.stats.boundaries += 1;
                        self.state = DecoderState::Locked {
                            last_data,
                            phase: next,
                            bits,
                        };
                        return;
                    }
                    Interval::Data => {
                        self.clock.update(interval);
                        self.push_bit(t, last_data);
                        self.state = DecoderState::Locked {
                            last_data: t.position,
                            phase: next,
                            bits: bits + 1,
                        };
                        return;
                    }
                    Interval::Desync => {
                        self.stats.desyncs += 1;
                        log::debug!(
                            "Desync at sample {} after {} bits (interval {:.1}, cell {:.1})",
                            t.position,
                            bits,
                            interval,
                            self.clock.cell()
                        );
                        self.pending.push_back(Symbol::Desync {
                            position: t.position,
                        });
                        self.state = DecoderState::Unsynced {
                            last_edge: t.position,
                            since: t.position,
                        };
                        return;
                    }
                }
            }
            DecoderState::Idle => {}
        }

        // Idle, possibly re-entered above by a gap
        match t.polarity {
            Polarity::Falling => self.stats.leading_edges += 1,
            Polarity::Rising => {
                self.clock.reset();
                let start = t.position.saturating_sub(self.clock.nominal() as usize);
                self.push_bit(t, start);
                self.state = DecoderState::Locked {
                    last_data: t.position,
                    phase: CellPhase::AtData,
                    bits: 1,
                };
            }
        }
    }

    fn on_end(&mut self) {
        let len = self.transitions.len();
        if let DecoderState::Locked {
            last_data, bits, ..
        } = self.state
        {
            if (len - last_data) as f64 > self.limits.gap * self.clock.cell() {
                self.close_run(last_data, bits);
                self.state = DecoderState::Idle;
            } else {
                // Cut off by the end of the capture
                self.count_run(bits);
            }
        }
        self.pending.push_back(Symbol::EndOfSignal { position: len });
        self.finished = true;
        log::debug!(
            "Channel scan finished: {} transitions, {} bits, {} gaps, {} desyncs, quality {:.3}",
            self.stats.transitions,
            self.stats.bits,
            self.stats.gaps,
            self.stats.desyncs,
            self.stats.quality()
        );
    }

    fn abandon(&mut self, position: usize) {
        log::debug!("Abandoning channel scan at sample {}: no timing lock", position);
        self.stats.abandoned = true;
        self.pending.push_back(Symbol::EndOfSignal { position });
        self.finished = true;
    }

    fn push_bit(&mut self, t: Transition, start: usize) {
        self.stats.bits += 1;
        self.pending.push_back(Symbol::Bit(Bit {
            value: t.polarity == Polarity::Falling,
            start,
            end: t.position,
        }));
    }

    fn close_run(&mut self, last_data: usize, bits: usize) {
        self.count_run(bits);
        self.emit_gap(last_data + (self.limits.gap * self.clock.cell()) as usize);
    }

    fn count_run(&mut self, bits: usize) {
        if bits >= self.viable_run_bits {
            self.stats.framed_runs += 1;
            self.stats.framed_bits += bits;
        }
    }

    fn emit_gap(&mut self, position: usize) {
        self.stats.gaps += 1;
        self.pending.push_back(Symbol::Gap { position });
    }
}

impl Iterator for BitStream<'_> {
    type Item = Symbol;

    fn next(&mut self) -> Option<Symbol> {
        loop {
            if let Some(symbol) = self.pending.pop_front() {
                return Some(symbol);
            }
            if self.finished {
                return None;
            }
            match self.transitions.next() {
                Some(t) => self.on_transition(t),
                None => self.on_end(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const AMPLITUDE: i16 = 12000;
    const CELL: usize = 196;

    /// Phase-encoded square wave with silence before and after
    fn pe_wave(bits: &[bool], cells: &[usize], lead: usize, tail: usize) -> Vec<i16> {
        let mut samples = vec![0i16; lead];
        for (&bit, &cell) in bits.iter().zip(cells) {
            let (first, second) = if bit { (AMPLITUDE, -AMPLITUDE) } else { (-AMPLITUDE, AMPLITUDE) };
            samples.extend(std::iter::repeat(first).take(cell / 2));
            samples.extend(std::iter::repeat(second).take(cell - cell / 2));
        }
        samples.extend(std::iter::repeat(0).take(tail));
        samples
    }

    fn pattern() -> Vec<bool> {
        // 0x55-ish lead-in followed by runs of equal bits
        [0, 1, 0, 1, 0, 1, 0, 1, 1, 1, 0, 0, 0, 1, 1, 0, 1, 0, 0, 1, 1, 1, 1, 0]
            .iter()
            .map(|&b| b == 1)
            .collect()
    }

    #[test]
    fn test_decodes_clean_run() {
        let bits = pattern();
        let samples = pe_wave(&bits, &vec![CELL; bits.len()], 1000, 2000);
        let config = DecoderConfig::default();
        let decoder = ChannelDecoder::new(&samples, &config);
        let symbols: Vec<Symbol> = decoder.symbols().collect();

        assert!(matches!(symbols[0], Symbol::Gap { .. }));
        let decoded: Vec<Bit> = symbols
            .iter()
            .filter_map(|s| match s {
                Symbol::Bit(b) => Some(*b),
                _ => None,
            })
            .collect();
        assert_eq!(decoded.iter().map(|b| b.value).collect::<Vec<_>>(), bits);
        for (i, bit) in decoded.iter().enumerate() {
            assert_eq!(bit.end, 1000 + i * CELL + CELL / 2);
        }

        let n = symbols.len();
        assert!(matches!(symbols[n - 2], Symbol::Gap { .. }));
        assert_eq!(symbols[n - 1], Symbol::EndOfSignal { position: samples.len() });

        let stats = decoder.survey();
        let equal_pairs = bits.windows(2).filter(|w| w[0] == w[1]).count();
        assert_eq!(stats.bits, bits.len());
        assert_eq!(stats.boundaries, equal_pairs);
        assert_eq!(stats.leading_edges, 1);
        assert_eq!(stats.framed_runs, 1);
        assert_eq!(stats.framed_bits, bits.len());
        assert_eq!(stats.desyncs, 0);
        assert!((stats.quality() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_speed_step_desyncs_at_first_late_transition() {
        let bits: Vec<bool> = (0..32).map(|i| i % 2 == 1).collect();
        let mut cells = vec![CELL; 16];
        cells.extend(vec![CELL * 5 / 2; 16]);
        let samples = pe_wave(&bits, &cells, 1000, 3000);
        let config = DecoderConfig::default();

        let symbols: Vec<Symbol> = ChannelDecoder::new(&samples, &config).symbols().collect();
        let desync = symbols.iter().position(|s| matches!(s, Symbol::Desync { .. }));
        let desync = desync.expect("speed step must desync");

        let bits_before = symbols[..desync].iter().filter(|s| matches!(s, Symbol::Bit(_))).count();
        assert_eq!(bits_before, 16);
        let expected = 1000 + 16 * CELL + (CELL * 5 / 2) / 2;
        assert_eq!(symbols[desync].position(), expected);
    }

    /// Clean run, then a run whose speed jumps 2.5x after 16 bits and stays
    /// there for `slow_bits` cells, then another clean run
    fn damaged_between_clean_runs(slow_bits: usize) -> Vec<i16> {
        let clean = pattern();
        let mut samples = pe_wave(&clean, &vec![CELL; clean.len()], 1000, 2000);

        let damaged: Vec<bool> = (0..16 + slow_bits).map(|i| i % 2 == 1).collect();
        let mut cells = vec![CELL; 16];
        cells.extend(vec![CELL * 5 / 2; slow_bits]);
        samples.extend(pe_wave(&damaged, &cells, 0, 3000));

        samples.extend(pe_wave(&clean, &vec![CELL; clean.len()], 0, 2000));
        samples
    }

    #[test]
    fn test_unterminated_run_has_no_trailing_gap() {
        let bits = pattern();
        let samples = pe_wave(&bits, &vec![CELL; bits.len()], 1000, 0);
        let config = DecoderConfig::default();
        let mut stream = ChannelDecoder::new(&samples, &config).symbols();
        let symbols: Vec<Symbol> = stream.by_ref().collect();

        let n = symbols.len();
        assert!(matches!(symbols[n - 2], Symbol::Bit(_)));
        assert!(matches!(symbols[n - 1], Symbol::EndOfSignal { .. }));
        assert!(matches!(stream.state(), DecoderState::Locked { bits: 24, .. }));

        // A run cut off by the end of the capture still shows the channel is live
        let stats = stream.into_stats();
        assert_eq!(stats.framed_runs, 1);
        assert_eq!(stats.framed_bits, bits.len());
        assert!((stats.quality() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_desynced_stretch_costs_one_misfit() {
        let samples = damaged_between_clean_runs(200);
        let config = DecoderConfig::default();
        let stats = ChannelDecoder::new(&samples, &config).survey();

        assert_eq!(stats.desyncs, 1);
        assert_eq!(stats.framed_runs, 2);
        assert_eq!(stats.bits, 24 + 16 + 24);
        assert!(stats.lost > stats.bits);
        assert!(stats.quality() > 0.95, "quality {}", stats.quality());
    }

    #[test]
    fn test_no_abandonment_after_framed_run() {
        // 300 slow cells span far more than one second
        let samples = damaged_between_clean_runs(300);
        let config = DecoderConfig {
            max_unsynced_span: Some(44100),
            ..DecoderConfig::default()
        };
        let decoder = ChannelDecoder::new(&samples, &config);
        let stats = decoder.survey();

        assert!(!stats.abandoned);
        assert_eq!(stats.framed_runs, 2);
        let bits = decoder.symbols().filter(|s| matches!(s, Symbol::Bit(_))).count();
        assert_eq!(bits, 24 + 16 + 24);
    }

    #[test]
    fn test_silence_yields_only_end_of_signal() {
        let samples = vec![0i16; 44100];
        let config = DecoderConfig::default();
        let decoder = ChannelDecoder::new(&samples, &config);
        let symbols: Vec<Symbol> = decoder.symbols().collect();
        assert_eq!(symbols, vec![Symbol::EndOfSignal { position: 44100 }]);

        let stats = decoder.survey();
        assert_eq!(stats.transitions, 0);
        assert_eq!(stats.quality(), 0.0);
    }

    #[test]
    fn test_noise_is_abandoned_with_low_quality() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples: Vec<i16> = (0..200_000).map(|_| rng.gen_range(-20000..=20000)).collect();
        let config = DecoderConfig {
            max_unsynced_span: Some(44100),
            ..DecoderConfig::default()
        };
        let stats = ChannelDecoder::new(&samples, &config).survey();
        assert!(stats.abandoned);
        assert!(stats.quality() < 0.6);
        assert_eq!(stats.framed_runs, 0);
    }

    #[test]
    fn test_streams_are_restartable() {
        let bits = pattern();
        let samples = pe_wave(&bits, &vec![CELL; bits.len()], 1000, 2000);
        let config = DecoderConfig::default();
        let decoder = ChannelDecoder::new(&samples, &config);

        let first: Vec<Symbol> = decoder.symbols().collect();
        let second: Vec<Symbol> = decoder.symbols().collect();
        assert_eq!(first, second);
    }
}
