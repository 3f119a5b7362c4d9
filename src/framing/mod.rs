//! Framing layer: bit symbols to records and tape marks

pub mod assembler;
pub mod crc;
pub mod record;

pub use assembler::{assemble, AssemblyStats, FrameAssembler};
pub use record::{Record, RecordFlag, TapeEntry, TapeImage};
