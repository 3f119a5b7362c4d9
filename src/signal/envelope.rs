//! Rolling peak envelope and adaptive noise threshold
//!
//! Tape captures drift in gain over their length (head wear, recorder level,
//! dropouts), so a fixed zero-crossing threshold either misses quiet stretches
//! or lets hiss through on loud ones. The tracker follows the local peak
//! amplitude with a peak-hold detector that decays exponentially, and derives
//! the threshold as a fraction of it, never going below an absolute floor.
//!
//! # Example
//!
//! ```
//! use comet_tape::signal::envelope::EnvelopeTracker;
//!
//! let mut tracker = EnvelopeTracker::new(2500, 0.25, 2205);
//! let threshold = tracker.update(20000);
//! assert_eq!(threshold, 5000.0);
//! ```

/// Peak-hold envelope follower with exponential decay
#[derive(Debug, Clone)]
pub struct EnvelopeTracker {
    envelope: f32,
    decay: f32,
    ratio: f32,
    floor: f32,
}

impl EnvelopeTracker {
    /// Create a tracker
    ///
    /// # Arguments
    ///
    /// * `floor` - Absolute minimum threshold (sample units)
    /// * `ratio` - Threshold as a fraction of the envelope
    /// * `half_life` - Samples for the envelope to decay to half its value
    pub fn new(floor: i16, ratio: f32, half_life: usize) -> Self {
        let decay = 0.5f32.powf(1.0 / half_life.max(1) as f32);
        Self {
            envelope: 0.0,
            decay,
            ratio,
            floor: floor as f32,
        }
    }

    /// Feed one sample and return the threshold that applies to it
    #[inline]
    pub fn update(&mut self, sample: i16) -> f32 {
        let magnitude = (sample as f32).abs();
        self.envelope = magnitude.max(self.envelope * self.decay);
        self.threshold()
    }

    /// Current threshold
    #[inline]
    pub fn threshold(&self) -> f32 {
        (self.envelope * self.ratio).max(self.floor)
    }

    /// Current envelope estimate
    pub fn envelope(&self) -> f32 {
        self.envelope
    }
}
