//! Signal layer: samples to self-clocked bit symbols
//!
//! Pipeline per channel:
//! 1. [`envelope`] - adaptive noise threshold
//! 2. [`transitions`] - hysteresis polarity reversals
//! 3. [`cell`] - bit-cell timing recovery and interval classification
//! 4. [`decoder`] - run state machine producing [`Symbol`]s

pub mod cell;
pub mod decoder;
pub mod envelope;
pub mod transitions;

pub use decoder::{Bit, BitStream, ChannelDecoder, DecodeStats, DecoderState, Symbol};
pub use transitions::{Polarity, Transition};
