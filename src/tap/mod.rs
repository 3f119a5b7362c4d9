//! SIMH-TAP tape image container

pub mod reader;
pub mod writer;

pub use reader::{TapItem, TapReader};
pub use writer::TapWriter;

/// Length word of a tape mark
pub const TAPE_MARK: u32 = 0x0000_0000;

/// End-of-medium marker
pub const END_OF_MEDIUM: u32 = 0xFFFF_FFFF;

/// Largest record length the 28-bit length field can express
pub const MAX_RECORD_LEN: u32 = 0x0FFF_FFFF;
