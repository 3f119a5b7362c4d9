//! Capture decoding using Symphonia
//!
//! Reads any container Symphonia can probe (WAV and FLAC are enabled) and
//! returns the channels as separate `i16` sample vectors. Symphonia hands
//! out planar buffers, so channels are copied out directly; sources with
//! other sample formats are converted to 16 bit.

use crate::error::TapeError;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::default::{get_codecs, get_probe};

/// A decoded multi-channel capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// One sample vector per channel, all of the same length
    pub channels: Vec<Vec<i16>>,
}

impl Capture {
    /// Number of sample frames
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Append every channel of a decoded buffer, converted to 16 bit
fn append_planar(decoded: &AudioBufferRef, channels: &mut [Vec<i16>]) {
    match decoded {
        AudioBufferRef::U8(buf) => append_channels(buf, channels),
        AudioBufferRef::U16(buf) => append_channels(buf, channels),
        AudioBufferRef::U24(buf) => append_channels(buf, channels),
        AudioBufferRef::U32(buf) => append_channels(buf, channels),
        AudioBufferRef::S8(buf) => append_channels(buf, channels),
        AudioBufferRef::S16(buf) => append_channels(buf, channels),
        AudioBufferRef::S24(buf) => append_channels(buf, channels),
        AudioBufferRef::S32(buf) => append_channels(buf, channels),
        AudioBufferRef::F32(buf) => append_channels(buf, channels),
        AudioBufferRef::F64(buf) => append_channels(buf, channels),
    }
}

fn append_channels<S>(buf: &AudioBuffer<S>, channels: &mut [Vec<i16>])
where
    S: Sample + IntoSample<i16>,
{
    let count = buf.spec().channels.count().min(channels.len());
    for (index, channel) in channels.iter_mut().enumerate().take(count) {
        channel.extend(buf.chan(index).iter().map(|&s| s.into_sample()));
    }
}

fn decoding_error(path: &Path, err: SymphoniaError) -> TapeError {
    TapeError::DecodingError(format!("{}: {}", path.display(), err))
}

/// Decode an audio file into per-channel samples
///
/// # Arguments
///
/// * `path` - Path to the capture
///
/// # Returns
///
/// The decoded [`Capture`]
///
/// # Errors
///
/// Returns `TapeError::IoError` if the file cannot be opened and
/// `TapeError::DecodingError` if it holds no decodable audio track.
pub fn read_capture<P: AsRef<Path>>(path: P) -> Result<Capture, TapeError> {
    let path = path.as_ref();
    log::debug!("Decoding capture: {}", path.display());

    let src = File::open(path)
        .map_err(|e| TapeError::IoError(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decoding_error(path, e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            TapeError::DecodingError(format!("{}: no supported audio track", path.display()))
        })?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
        TapeError::DecodingError(format!("{}: unknown sample rate", path.display()))
    })?;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decoding_error(path, e))?;

    let mut channels: Vec<Vec<i16>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decoding_error(path, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("{}: skipping corrupt packet: {}", path.display(), msg);
                continue;
            }
            Err(e) => return Err(decoding_error(path, e)),
        };

        if channels.is_empty() {
            channels = vec![Vec::new(); decoded.spec().channels.count()];
        }
        append_planar(&decoded, &mut channels);
    }

    if channels.is_empty() {
        return Err(TapeError::DecodingError(format!(
            "{}: no audio frames decoded",
            path.display()
        )));
    }

    let capture = Capture {
        sample_rate,
        channels,
    };
    log::debug!(
        "Decoded {} channels, {} frames at {} Hz ({:.1} s)",
        capture.channels.len(),
        capture.frames(),
        capture.sample_rate,
        capture.duration_seconds()
    );
    Ok(capture)
}
