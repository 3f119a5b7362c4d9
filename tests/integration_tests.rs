//! Integration tests for tape recovery

use comet_tape::analysis::arbiter::survey_channels;
use comet_tape::synth::{frame_payload, TapeSynthesizer};
use comet_tape::tap::{TapItem, TapReader};
use comet_tape::{decode_capture, process_file, DecoderConfig, RecordFlag, TapeEntry, TapeError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

/// Write channels as a 16-bit 44.1 kHz WAV file
fn write_wav(path: &Path, channels: &[Vec<i16>]) -> Result<(), Box<dyn std::error::Error>> {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..frames {
        for channel in channels {
            writer.write_sample(channel.get(i).copied().unwrap_or(0))?;
        }
    }
    writer.finalize()?;
    Ok(())
}

fn payloads() -> Vec<Vec<u8>> {
    vec![
        b"FIRST RECORD OF THE TAPE".to_vec(),
        (0u8..=255).collect(),
        vec![0x00; 40],
        vec![0xFF; 33],
        b"LAST".to_vec(),
    ]
}

fn framed(payload: &[u8]) -> Vec<u8> {
    frame_payload(payload, 0xAA, 0xAA)
}

fn synth_with(payloads: &[Vec<u8>], config: &DecoderConfig) -> TapeSynthesizer {
    let mut synth = TapeSynthesizer::new(config).gap(20);
    for payload in payloads {
        synth = synth.record(payload).gap(20);
    }
    synth
}

fn tap_records(bytes: &[u8]) -> Vec<TapItem> {
    TapReader::read_all(bytes).expect("image should parse")
}

fn recovered_records(samples: Vec<i16>, config: &DecoderConfig) -> Vec<Vec<u8>> {
    let result = decode_capture(&[samples], 44100, config).expect("decode should succeed");
    result.image.records().map(|r| r.bytes.clone()).collect()
}

/// Good records, then one whose tape speed jumps 2.5x after 64 bits and
/// recovers at its end, then one more good record
fn speed_damaged_tape(before: &[Vec<u8>], damaged: &[u8], after: &[u8], config: &DecoderConfig) -> Vec<i16> {
    let mut synth = TapeSynthesizer::new(config).gap(20);
    for payload in before {
        synth = synth.record(payload).gap(20);
    }
    let step = synth.cell_count() + 64;
    let synth = synth.record(damaged);
    let recover = synth.cell_count();
    synth
        .gap(20)
        .record(after)
        .gap(20)
        .speed_step(step, 2.5)
        .speed_step(recover, 1.0 / 2.5)
        .render()
        .samples
}

fn good_records(count: usize, len: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| (0..len).map(|j| (i * 31 + j) as u8).collect())
        .collect()
}

fn letters(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'A' + (i % 26) as u8).collect()
}

/// Decode and check that only the damaged record is lost
fn assert_damage_contained(samples: Vec<i16>, before: &[Vec<u8>], after: &[u8], config: &DecoderConfig) {
    let result = decode_capture(&[samples], 44100, config).expect("good records keep the channel usable");
    assert!(!result.decode.abandoned);

    let records: Vec<_> = result.image.records().collect();
    assert_eq!(records.len(), before.len() + 2);
    for (record, payload) in records.iter().zip(before) {
        assert!(record.is_valid());
        assert_eq!(record.bytes, framed(payload));
    }

    let damaged = records[before.len()];
    assert!(damaged.has_flag(RecordFlag::Desync));
    assert_eq!(damaged.bit_count, 64);

    let last = records[before.len() + 1];
    assert!(last.is_valid());
    assert_eq!(last.bytes, framed(after));
    assert_eq!(result.summary().invalid_records, 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_wav_file() {
        let config = DecoderConfig::default();
        let tape = synth_with(&payloads(), &config).render();

        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("comet.wav");
        write_wav(&wav, &[tape.samples]).unwrap();

        let processed = process_file(&wav, None, true, &config).expect("processing should succeed");
        assert_eq!(processed.tap_path, dir.path().join("comet.wav.TAP"));
        let summary = processed.result.summary();
        assert_eq!(summary.records, payloads().len());
        assert_eq!(summary.invalid_records, 0);
        assert_eq!(summary.selected_channel, 0);

        let bytes = std::fs::read(&processed.tap_path).unwrap();
        let mut expected: Vec<TapItem> = payloads().iter().map(|p| TapItem::Record(framed(p))).collect();
        expected.push(TapItem::EndOfMedium);
        assert_eq!(tap_records(&bytes), expected);

        let meta = std::fs::read_to_string(processed.meta_path.unwrap()).unwrap();
        assert!(meta.contains("BitStore.Filename:\n\tcomet.wav.TAP\n"));
        assert_eq!(meta.matches(" bytes [").count(), payloads().len());
        assert!(meta.ends_with("*END*\n"));
    }

    #[test]
    fn test_sub_threshold_noise_is_rejected() {
        let config = DecoderConfig::default();
        let tape = synth_with(&payloads(), &config).render();
        let mut rng = StdRng::seed_from_u64(2089);
        let noisy: Vec<i16> = tape
            .samples
            .iter()
            .map(|&s| s.saturating_add(rng.gen_range(-2000..=2000)))
            .collect();

        let expected: Vec<Vec<u8>> = payloads().iter().map(|p| framed(p)).collect();
        assert_eq!(recovered_records(noisy, &config), expected);

        // Noise alone never forms a record
        let hiss: Vec<i16> = (0..200_000).map(|_| rng.gen_range(-2000..=2000)).collect();
        let result = decode_capture(&[hiss], 44100, &config);
        assert!(matches!(result, Err(TapeError::NoValidChannel(_))));
    }

    #[test]
    fn test_tolerates_five_percent_drift() {
        let config = DecoderConfig::default();
        let expected: Vec<Vec<u8>> = payloads().iter().map(|p| framed(p)).collect();

        for drift in [0.05, -0.05] {
            let tape = synth_with(&payloads(), &config).drift(drift).render();
            assert_eq!(
                recovered_records(tape.samples, &config),
                expected,
                "drift {:+}",
                drift
            );
        }
    }

    #[test]
    fn test_speed_step_flags_desync_at_step() {
        let config = DecoderConfig::default();
        let first = b"BEFORE THE SPLICE".to_vec();
        let damaged: Vec<u8> = (100u8..130).collect();
        let last = b"AFTER THE SPLICE".to_vec();

        let synth = TapeSynthesizer::new(&config).gap(20).record(&first).gap(20);
        let bits_before = framed(&first).len() * 8;
        let step_cell = synth.cell_count() + 64;
        let tape = synth
            .record(&damaged)
            .gap(20)
            .record(&last)
            .gap(20)
            .speed_step(step_cell, 2.5)
            .render();

        let result = decode_capture(&[tape.samples], 44100, &config).unwrap();
        let records: Vec<_> = result.image.records().collect();
        assert_eq!(records.len(), 3);

        assert!(records[0].is_valid());
        assert_eq!(records[0].bytes, framed(&first));

        assert!(records[1].has_flag(RecordFlag::Desync));
        assert_eq!(records[1].bit_count, 64);
        assert_eq!(records[1].end, tape.bit_positions[bits_before + 63]);

        assert!(records[2].is_valid());
        assert_eq!(records[2].bytes, framed(&last));
    }

    #[test]
    fn test_tape_mark_round_trip() {
        let config = DecoderConfig::default();
        let tape = TapeSynthesizer::new(&config)
            .gap(20)
            .record(b"FILE ONE")
            .gap(20)
            .tape_mark()
            .gap(20)
            .record(b"FILE TWO")
            .gap(20)
            .tape_mark()
            .gap(20)
            .render();

        let result = decode_capture(&[tape.samples], 44100, &config).unwrap();
        assert_eq!(result.summary().tape_marks, 2);
        let bytes = result.image.to_tap_bytes().unwrap();
        assert_eq!(
            tap_records(&bytes),
            vec![
                TapItem::Record(framed(b"FILE ONE")),
                TapItem::TapeMark,
                TapItem::Record(framed(b"FILE TWO")),
                TapItem::TapeMark,
                TapItem::EndOfMedium,
            ]
        );
    }

    #[test]
    fn test_processing_is_idempotent() {
        let config = DecoderConfig::default();
        let tape = synth_with(&payloads(), &config).drift(0.02).render();

        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("again.wav");
        write_wav(&wav, &[tape.samples]).unwrap();

        let out_a = dir.path().join("a");
        let out_b = dir.path().join("b");
        std::fs::create_dir(&out_a).unwrap();
        std::fs::create_dir(&out_b).unwrap();

        let a = process_file(&wav, Some(&out_a), true, &config).unwrap();
        let b = process_file(&wav, Some(&out_b), true, &config).unwrap();

        assert_eq!(std::fs::read(&a.tap_path).unwrap(), std::fs::read(&b.tap_path).unwrap());
        assert_eq!(
            std::fs::read(a.meta_path.unwrap()).unwrap(),
            std::fs::read(b.meta_path.unwrap()).unwrap()
        );
    }

    #[test]
    fn test_corrupted_record_is_contained() {
        let config = DecoderConfig::default();
        let mut corrupt = framed(b"THIS RECORD WAS DAMAGED");
        corrupt[5] ^= 0x21;

        let tape = TapeSynthesizer::new(&config)
            .gap(20)
            .record(b"GOOD BEFORE")
            .gap(20)
            .raw_bytes(&corrupt)
            .gap(20)
            .record(b"GOOD AFTER")
            .gap(20)
            .record(b"CUT OFF BY THE END OF THE CAPTURE")
            .render();

        let result = decode_capture(&[tape.samples], 44100, &config).unwrap();
        let records: Vec<_> = result.image.records().collect();
        assert_eq!(records.len(), 4);

        assert_eq!(records[0].bytes, framed(b"GOOD BEFORE"));
        assert!(records[0].is_valid());
        assert_eq!(records[1].bytes, corrupt);
        assert_eq!(records[1].flags, vec![RecordFlag::BadCrc]);
        assert_eq!(records[2].bytes, framed(b"GOOD AFTER"));
        assert!(records[2].is_valid());
        assert_eq!(records[3].flags, vec![RecordFlag::Unterminated]);

        // Damaged records still reach the image
        let bytes = result.image.to_tap_bytes().unwrap();
        assert_eq!(tap_records(&bytes)[1], TapItem::Record(corrupt));
        assert_eq!(result.summary().invalid_records, 2);
    }

    #[test]
    fn test_long_desynced_record_is_contained_without_abandonment() {
        let config = DecoderConfig {
            max_unsynced_span: None,
            ..DecoderConfig::default()
        };
        let before = good_records(3, 40);
        let samples = speed_damaged_tape(&before, &letters(125), b"GOOD AFTER", &config);
        assert_damage_contained(samples, &before, b"GOOD AFTER", &config);
    }

    #[test]
    fn test_desynced_stretch_longer_than_abandon_span_is_contained() {
        // Unsynchronised for about 35 s, beyond the default 20 s span
        let config = DecoderConfig::default();
        let before = good_records(3, 40);
        let samples = speed_damaged_tape(&before, &letters(400), b"GOOD AFTER", &config);

        let reports = survey_channels(&[samples.clone()], &config);
        assert!(reports[0].is_usable(), "{:?}", reports[0]);
        assert!(reports[0].quality > 0.99);

        assert_damage_contained(samples, &before, b"GOOD AFTER", &config);
    }

    #[test]
    fn test_records_after_long_desync_reach_the_image() {
        let config = DecoderConfig {
            max_unsynced_span: Some(44100),
            ..DecoderConfig::default()
        };
        let before = good_records(3, 200);
        let samples = speed_damaged_tape(&before, &letters(45), b"LAST GOOD RECORD", &config);
        assert_damage_contained(samples, &before, b"LAST GOOD RECORD", &config);
    }

    #[test]
    fn test_only_record_cut_off_still_completes() {
        let config = DecoderConfig::default();
        let payload = b"ONLY RECORD, CUT OFF BY THE END OF THE CAPTURE";
        let tape = TapeSynthesizer::new(&config).gap(20).record(payload).render();

        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("cutoff.wav");
        write_wav(&wav, &[tape.samples]).unwrap();

        let processed = process_file(&wav, None, true, &config).expect("an unterminated record is not a file failure");
        let summary = processed.result.summary();
        assert_eq!(summary.records, 1);
        assert_eq!(summary.invalid_records, 1);
        let record = processed.result.image.records().next().unwrap();
        assert_eq!(record.flags, vec![RecordFlag::Unterminated]);

        let bytes = std::fs::read(&processed.tap_path).unwrap();
        assert_eq!(
            tap_records(&bytes),
            vec![TapItem::Record(framed(payload)), TapItem::EndOfMedium]
        );
    }

    #[test]
    fn test_selects_data_channel_under_permutation() {
        let config = DecoderConfig::default();
        let tape = synth_with(&payloads(), &config).render();
        let len = tape.samples.len();

        let mut rng = StdRng::seed_from_u64(7);
        let silence = vec![0i16; len];
        let noise: Vec<i16> = (0..len).map(|_| rng.gen_range(-20000..=20000)).collect();
        let hum: Vec<i16> = (0..len)
            .map(|i| (10000.0 * (2.0 * std::f64::consts::PI * 50.0 * i as f64 / 44100.0).sin()) as i16)
            .collect();
        let base = [silence, noise, hum, tape.samples];
        let expected: Vec<Vec<u8>> = payloads().iter().map(|p| framed(p)).collect();

        let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];
        for order in orders {
            let channels: Vec<Vec<i16>> = order.iter().map(|&i| base[i].clone()).collect();
            let data_channel = order.iter().position(|&i| i == 3).unwrap();

            let reports = survey_channels(&channels, &config);
            assert_eq!(reports.iter().filter(|r| r.is_usable()).count(), 1);

            let result = decode_capture(&channels, 44100, &config).unwrap();
            assert_eq!(result.selected_channel, data_channel, "order {:?}", order);
            let records: Vec<Vec<u8>> = result.image.records().map(|r| r.bytes.clone()).collect();
            assert_eq!(records, expected);
        }
    }

    #[test]
    fn test_stereo_file_with_data_on_second_channel() {
        let config = DecoderConfig::default();
        let tape = synth_with(&payloads()[..2], &config).render();
        let silence = vec![0i16; tape.samples.len()];

        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("stereo.wav");
        write_wav(&wav, &[silence, tape.samples]).unwrap();

        let processed = process_file(&wav, None, false, &config).unwrap();
        assert_eq!(processed.result.selected_channel, 1);
        assert_eq!(processed.result.summary().records, 2);
        assert!(processed.meta_path.is_none());
        assert!(!PathBuf::from(format!("{}.meta", processed.tap_path.display())).exists());
    }

    #[test]
    fn test_no_valid_channel_writes_nothing() {
        let config = DecoderConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("blank.wav");
        write_wav(&wav, &[vec![0i16; 44100], vec![0i16; 44100]]).unwrap();

        let result = process_file(&wav, None, true, &config);
        assert!(matches!(result, Err(TapeError::NoValidChannel(_))));
        assert!(!dir.path().join("blank.wav.TAP").exists());
    }

    #[test]
    fn test_rejects_wrong_sample_rate() {
        let config = DecoderConfig::default();
        let result = decode_capture(&[vec![0i16; 1000]], 48000, &config);
        assert!(matches!(result, Err(TapeError::InvalidInput(_))));
    }

    #[test]
    fn test_capture_starting_mid_record() {
        let config = DecoderConfig::default();
        let tape = synth_with(&payloads()[..3], &config).render();
        // Drop the leading gap and half of the first record
        let start = tape.bit_positions[100];
        let samples = tape.samples[start..].to_vec();

        let records = recovered_records(samples, &config);
        let expected: Vec<Vec<u8>> = payloads()[1..3].iter().map(|p| framed(p)).collect();
        assert_eq!(records, expected);
    }

    #[test]
    fn test_tape_entries_are_in_temporal_order() {
        let config = DecoderConfig::default();
        let tape = synth_with(&payloads(), &config).render();
        let result = decode_capture(&[tape.samples], 44100, &config).unwrap();
        let positions: Vec<usize> = result.image.entries.iter().map(TapeEntry::position).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
