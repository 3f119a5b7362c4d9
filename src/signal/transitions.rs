//! Polarity transition detection
//!
//! Turns raw samples into the sequence of polarity reversals the bit decoder
//! works on. The signal is reduced to a sign with hysteresis: it becomes
//! positive once a sample exceeds the adaptive threshold, negative once a
//! sample falls below its negation, and otherwise keeps its previous value.
//! Each change of sign is one [`Transition`].

use super::envelope::EnvelopeTracker;
use crate::config::DecoderConfig;

/// Direction of a polarity reversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Signal went positive
    Rising,
    /// Signal went negative
    Falling,
}

/// A polarity reversal at a sample index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Sample index at which the new polarity was first observed
    pub position: usize,
    /// New polarity
    pub polarity: Polarity,
}

/// Lazy iterator over the transitions of one channel
#[derive(Debug, Clone)]
pub struct Transitions<'a> {
    samples: &'a [i16],
    index: usize,
    sign: i8,
    tracker: EnvelopeTracker,
}

impl<'a> Transitions<'a> {
    /// Create a transition iterator over `samples`
    pub fn new(samples: &'a [i16], config: &DecoderConfig) -> Self {
        Self {
            samples,
            index: 0,
            sign: 0,
            tracker: EnvelopeTracker::new(
                config.threshold_floor,
                config.threshold_ratio,
                config.envelope_half_life,
            ),
        }
    }

    /// Index of the next sample to be examined
    pub fn position(&self) -> usize {
        self.index
    }

    /// Total number of samples in the channel
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the channel holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Iterator for Transitions<'_> {
    type Item = Transition;

    fn next(&mut self) -> Option<Transition> {
        while self.index < self.samples.len() {
            let position = self.index;
            let sample = self.samples[position];
            self.index += 1;

            let threshold = self.tracker.update(sample);
            let value = sample as f32;
            let sign = if value > threshold {
                1
            } else if value < -threshold {
                -1
            } else {
                self.sign
            };

            if sign != self.sign {
                self.sign = sign;
                let polarity = if sign > 0 {
                    Polarity::Rising
                } else {
                    Polarity::Falling
                };
                return Some(Transition { position, polarity });
            }
        }
        None
    }
}
