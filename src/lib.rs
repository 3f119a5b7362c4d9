//! # Comet Tape
//!
//! Recovers the contents of self-clocking cassette tapes from audio captures
//! and writes them as SIMH-TAP images for archiving and emulation.
//!
//! ## Features
//!
//! - **Adaptive transition detection**: hysteresis thresholding against a rolling
//!   peak envelope, robust to gain drift and dropouts
//! - **Self-clocking bit recovery**: phase-encoded bits with a tracking bit-cell
//!   estimate that follows tape speed drift
//! - **Channel arbitration**: every channel of a capture is surveyed in parallel
//!   and the most consistent one is decoded
//! - **Framing checks**: preamble, postamble and CRC-16 on every record; damaged
//!   records are kept and flagged, never silently dropped
//! - **SIMH-TAP output** with an archival metadata document
//!
//! ## Quick Start
//!
//! ```no_run
//! use comet_tape::{decode_capture, io::decoder::read_capture, DecoderConfig};
//!
//! let capture = read_capture("tape.wav")?;
//! let result = decode_capture(&capture.channels, capture.sample_rate, &DecoderConfig::default())?;
//!
//! println!("{} records from channel {}", result.summary().records, result.selected_channel);
//! std::fs::write("tape.wav.TAP", result.image.to_tap_bytes()?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Capture → ChannelDecoder (per channel) → ChannelArbiter → FrameAssembler → TapWriter
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod framing;
pub mod io;
pub mod signal;
pub mod synth;
pub mod tap;

// Re-export main types
pub use analysis::arbiter::{ChannelReport, ChannelVerdict, UnusableReason};
pub use analysis::result::{DecodeResult, ProcessedFile, TapeSummary};
pub use config::DecoderConfig;
pub use error::TapeError;
pub use framing::{Record, RecordFlag, TapeEntry, TapeImage};
pub use signal::{ChannelDecoder, Symbol};

use analysis::arbiter::{select_channel, survey_channels};
use framing::FrameAssembler;
use std::path::{Path, PathBuf};
use tap::TapReader;

/// Main decoding function
///
/// Surveys every channel, selects the one carrying the tape data and
/// assembles its records into a tape image.
///
/// # Arguments
///
/// * `channels` - One sample vector per channel
/// * `sample_rate` - Sample rate of the capture in Hz
/// * `config` - Decoder configuration
///
/// # Returns
///
/// `DecodeResult` with the image, the channel surveys and decode counters
///
/// # Errors
///
/// Returns `TapeError::InvalidInput` for an empty capture, a sample rate that
/// differs from `config.sample_rate` or an invalid configuration, and
/// `TapeError::NoValidChannel` when no channel carries usable data.
///
/// # Example
///
/// ```
/// use comet_tape::{decode_capture, DecoderConfig};
/// use comet_tape::synth::TapeSynthesizer;
///
/// let config = DecoderConfig::default();
/// let tape = TapeSynthesizer::new(&config).gap(10).record(b"HELLO").gap(10).render();
///
/// let result = decode_capture(&[tape.samples], 44100, &config)?;
/// let record = result.image.records().next().unwrap();
/// assert_eq!(record.payload(), b"HELLO");
/// # Ok::<(), comet_tape::TapeError>(())
/// ```
pub fn decode_capture(
    channels: &[Vec<i16>],
    sample_rate: u32,
    config: &DecoderConfig,
) -> Result<DecodeResult, TapeError> {
    config.validate()?;
    if channels.is_empty() || channels.iter().all(|c| c.is_empty()) {
        return Err(TapeError::InvalidInput("Capture holds no samples".to_string()));
    }
    if sample_rate != config.sample_rate {
        return Err(TapeError::InvalidInput(format!(
            "Sample rate {} Hz does not match configured {} Hz",
            sample_rate, config.sample_rate
        )));
    }

    log::debug!(
        "Decoding capture: {} channels, {} samples",
        channels.len(),
        channels[0].len()
    );

    let reports = survey_channels(channels, config);
    let selected = select_channel(&reports)?.channel;
    log::info!("Selected channel {} of {}", selected, channels.len());

    // Fresh scan of the selected channel
    let mut stream = ChannelDecoder::new(&channels[selected], config).symbols();
    let mut assembler = FrameAssembler::new(config);
    for symbol in stream.by_ref() {
        assembler.push(symbol);
    }
    let (image, assembly) = assembler.finish();

    Ok(DecodeResult {
        image,
        selected_channel: selected,
        channels: reports,
        decode: stream.into_stats(),
        assembly,
    })
}

/// Decode one capture file and write its image next to it (or into `output_dir`)
///
/// Writes `<input>.TAP` and, when `write_metadata` is set, `<input>.TAP.meta`.
/// The serialized image is parsed back before it is written.
///
/// # Errors
///
/// Returns any error of [`io::decoder::read_capture`] or [`decode_capture`],
/// and `TapeError::IoError` if the outputs cannot be written.
pub fn process_file(
    path: &Path,
    output_dir: Option<&Path>,
    write_metadata: bool,
    config: &DecoderConfig,
) -> Result<ProcessedFile, TapeError> {
    let capture = io::decoder::read_capture(path)?;
    let result = decode_capture(&capture.channels, capture.sample_rate, config)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| TapeError::InvalidInput(format!("{}: not a file", path.display())))?
        .to_string_lossy()
        .into_owned();
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let tap_name = format!("{}.TAP", file_name);
    let tap_path = dir.join(&tap_name);

    let bytes = result.image.to_tap_bytes()?;
    verify_image(&bytes, &result.image)?;
    std::fs::write(&tap_path, &bytes)
        .map_err(|e| TapeError::IoError(format!("{}: {}", tap_path.display(), e)))?;

    let meta_path = if write_metadata {
        let meta_path: PathBuf = dir.join(format!("{}.meta", tap_name));
        let doc = analysis::metadata::bitstore_metadata(&tap_name, &result.image);
        std::fs::write(&meta_path, doc)
            .map_err(|e| TapeError::IoError(format!("{}: {}", meta_path.display(), e)))?;
        Some(meta_path)
    } else {
        None
    };

    log::info!(
        "{}: {} records ({} invalid), {} tape marks -> {}",
        path.display(),
        result.assembly.records,
        result.assembly.invalid_records,
        result.assembly.tape_marks,
        tap_path.display()
    );

    Ok(ProcessedFile {
        result,
        tap_path,
        meta_path,
    })
}

fn verify_image(bytes: &[u8], image: &TapeImage) -> Result<(), TapeError> {
    let items = TapReader::read_all(bytes)?;
    if items.len() != image.entries.len() + 1 {
        return Err(TapeError::DecodingError(format!(
            "Serialized image holds {} items, expected {}",
            items.len(),
            image.entries.len() + 1
        )));
    }
    Ok(())
}
