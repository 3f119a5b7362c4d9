//! Audio I/O
//!
//! Capture decoding using Symphonia.

pub mod decoder;

pub use decoder::{read_capture, Capture};
