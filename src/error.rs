//! Error types for the tape recovery pipeline

use std::fmt;

/// Errors that can occur while recovering a tape image
///
/// Decode-level anomalies (desyncs, checksum failures, truncated records) are
/// never errors: they are recorded as flags on the recovered data. Only
/// conditions that stop a whole input file are reported here.
#[derive(Debug, Clone)]
pub enum TapeError {
    /// Invalid input parameters or configuration
    InvalidInput(String),

    /// Audio container could not be read or decoded
    DecodingError(String),

    /// No channel of the capture carries usable tape data
    NoValidChannel(String),

    /// Failure while writing an output file
    IoError(String),
}

impl fmt::Display for TapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapeError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            TapeError::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
            TapeError::NoValidChannel(msg) => write!(f, "No valid tape data found: {}", msg),
            TapeError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TapeError {}

impl From<std::io::Error> for TapeError {
    fn from(err: std::io::Error) -> Self {
        TapeError::IoError(err.to_string())
    }
}
