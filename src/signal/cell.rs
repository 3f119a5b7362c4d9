//! Bit-cell timing recovery and interval classification
//!
//! The drives write phase-encoded data: every bit cell carries one transition
//! at its centre, rising for `0` and falling for `1`. When two consecutive
//! bits are equal the signal has to return to its starting level first, which
//! adds a boundary transition half a cell before the next data transition.
//!
//! Intervals are always measured from the last *data* transition, so the
//! classifier only has to remember whether a boundary transition has already
//! been seen in the current cell:
//!
//! ```text
//! phase        interval d (T = bit-cell estimate)   result        next phase
//! ----------   ----------------------------------   -----------   ----------
//! any          d > gap·T                            Gap           -
//! any          run still acquiring lock             Data          AtData
//! AtData       d < edge·T                           Boundary      AtBoundary
//! AtData       edge·T <= d <= max·T                 Data          AtData
//! AtBoundary   d < edge·T                           Desync        -
//! AtBoundary   edge·T <= d <= max·T                 Data          AtData
//! any          max·T < d <= gap·T                   Desync        -
//! ```

use crate::config::DecoderConfig;

/// Position inside the current bit cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellPhase {
    /// Last transition was a data transition
    AtData,
    /// A boundary transition has been seen since the last data transition
    AtBoundary,
}

/// Classification of the interval since the last data transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    /// Mid-cell data transition: one bit
    Data,
    /// Cell-boundary transition between two equal bits
    Boundary,
    /// Interval fits neither class: bit timing lost
    Desync,
    /// Silence long enough to separate records
    Gap,
}

/// Interval thresholds, in bit-cells
#[derive(Debug, Clone, Copy)]
pub struct CellLimits {
    /// Boundary/data decision point
    pub edge: f64,
    /// Longest accepted data interval
    pub max: f64,
    /// Gap threshold
    pub gap: f64,
    /// Bits accepted unconditionally at the start of a run
    pub acquisition_bits: usize,
}

impl From<&DecoderConfig> for CellLimits {
    fn from(config: &DecoderConfig) -> Self {
        Self {
            edge: config.edge_factor,
            max: config.max_cell_factor,
            gap: config.gap_factor,
            acquisition_bits: config.acquisition_bits,
        }
    }
}

impl CellPhase {
    /// Apply the transition table
    ///
    /// # Arguments
    ///
    /// * `interval` - Samples since the last data transition
    /// * `cell` - Current bit-cell estimate in samples
    /// * `run_bits` - Bits already produced in the current run
    /// * `limits` - Interval thresholds
    ///
    /// # Returns
    ///
    /// The interval class and the phase to continue in. The phase is
    /// meaningless after `Desync` and `Gap`, which end the run.
    pub fn classify(
        self,
        interval: f64,
        cell: f64,
        run_bits: usize,
        limits: &CellLimits,
    ) -> (Interval, CellPhase) {
        let cells = interval / cell;

        if cells > limits.gap {
            return (Interval::Gap, CellPhase::AtData);
        }
        if run_bits < limits.acquisition_bits {
            return (Interval::Data, CellPhase::AtData);
        }

        match self {
            CellPhase::AtData if cells < limits.edge => (Interval::Boundary, CellPhase::AtBoundary),
            CellPhase::AtBoundary if cells < limits.edge => (Interval::Desync, self),
            _ if cells <= limits.max => (Interval::Data, CellPhase::AtData),
            _ => (Interval::Desync, self),
        }
    }
}

/// Adaptive bit-cell estimate
///
/// A first-order tracker: every accepted data interval pulls the estimate
/// towards itself by `1 / divisor` of the difference, which absorbs slow
/// tape-speed drift (wow, flutter, stretched tape) within a few bits.
#[derive(Debug, Clone)]
pub struct BitClock {
    nominal: f64,
    cell: f64,
    divisor: f64,
}

impl BitClock {
    /// Create a clock at the nominal cell length
    pub fn new(nominal: f64, divisor: f64) -> Self {
        Self {
            nominal,
            cell: nominal,
            divisor,
        }
    }

    /// Return to the nominal cell length (start of a new run)
    pub fn reset(&mut self) {
        self.cell = self.nominal;
    }

    /// Current estimate in samples
    #[inline]
    pub fn cell(&self) -> f64 {
        self.cell
    }

    /// Nominal cell length in samples
    pub fn nominal(&self) -> f64 {
        self.nominal
    }

    /// Track an accepted data interval
    #[inline]
    pub fn update(&mut self, interval: f64) {
        self.cell += (interval - self.cell) / self.divisor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> CellLimits {
        CellLimits::from(&DecoderConfig::default())
    }

    #[test]
    fn test_locked_transition_table() {
        let l = limits();
        let t = 100.0;
        let run = 16;

        assert_eq!(CellPhase::AtData.classify(100.0, t, run, &l), (Interval::Data, CellPhase::AtData));
        assert_eq!(CellPhase::AtData.classify(50.0, t, run, &l), (Interval::Boundary, CellPhase::AtBoundary));
        assert_eq!(CellPhase::AtBoundary.classify(100.0, t, run, &l), (Interval::Data, CellPhase::AtData));
        assert_eq!(CellPhase::AtBoundary.classify(60.0, t, run, &l).0, Interval::Desync);
        assert_eq!(CellPhase::AtData.classify(180.0, t, run, &l).0, Interval::Desync);
        assert_eq!(CellPhase::AtBoundary.classify(300.0, t, run, &l).0, Interval::Desync);
        assert_eq!(CellPhase::AtData.classify(401.0, t, run, &l).0, Interval::Gap);
    }

    #[test]
    fn test_tolerance_edges() {
        let l = limits();
        assert_eq!(CellPhase::AtData.classify(72.0, 100.0, 16, &l).0, Interval::Data);
        assert_eq!(CellPhase::AtData.classify(71.9, 100.0, 16, &l).0, Interval::Boundary);
        assert_eq!(CellPhase::AtData.classify(150.0, 100.0, 16, &l).0, Interval::Data);
        assert_eq!(CellPhase::AtData.classify(150.1, 100.0, 16, &l).0, Interval::Desync);
        assert_eq!(CellPhase::AtData.classify(400.0, 100.0, 16, &l).0, Interval::Desync);
    }

    #[test]
    fn test_acquisition_accepts_any_non_gap_interval() {
        let l = limits();
        assert_eq!(CellPhase::AtData.classify(40.0, 100.0, 3, &l), (Interval::Data, CellPhase::AtData));
        assert_eq!(CellPhase::AtData.classify(250.0, 100.0, 7, &l), (Interval::Data, CellPhase::AtData));
        assert_eq!(CellPhase::AtData.classify(450.0, 100.0, 3, &l).0, Interval::Gap);
        assert_eq!(CellPhase::AtData.classify(40.0, 100.0, 8, &l).0, Interval::Boundary);
    }

    #[test]
    fn test_bit_clock_tracks_drift() {
        let mut clock = BitClock::new(196.0, 2.0);
        clock.update(206.0);
        assert!((clock.cell() - 201.0).abs() < 1e-9);
        for _ in 0..20 {
            clock.update(210.0);
        }
        assert!((clock.cell() - 210.0).abs() < 0.01);
        clock.reset();
        assert_eq!(clock.cell(), clock.nominal());
    }
}
