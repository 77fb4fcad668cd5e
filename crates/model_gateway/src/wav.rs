//! WAV encoding of canonical audio.
//!
//! Chat and transcription calls both ship the prepared audio as a 16-bit
//! mono PCM WAV container. Encoding is deterministic so one request encodes
//! the buffer exactly once and reuses the bytes for every attempt.

use std::io::Cursor;

use bytes::Bytes;
use triage_core::types::CanonicalAudio;
use triage_core::{Error, Result};

/// Encodes canonical audio as a 16-bit mono PCM WAV file.
pub fn encode_wav(audio: &CanonicalAudio) -> Result<Bytes> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| Error::internal(format!("failed to open wav writer: {e}")))?;
    for &sample in &audio.samples {
        let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(quantized)
            .map_err(|e| Error::internal(format!("failed to write wav sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::internal(format!("failed to finalize wav: {e}")))?;

    Ok(Bytes::from(cursor.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use triage_core::types::CANONICAL_SAMPLE_RATE;

    fn tone(len: usize) -> CanonicalAudio {
        let samples: Vec<f32> = (0..len)
            .map(|i| (i as f32 * 0.02).sin() * 0.5)
            .collect();
        let duration = Duration::from_secs_f64(len as f64 / f64::from(CANONICAL_SAMPLE_RATE));
        CanonicalAudio::new(samples, CANONICAL_SAMPLE_RATE, duration)
    }

    #[test]
    fn produces_a_riff_wave_header() {
        let bytes = encode_wav(&tone(160)).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn encoding_is_deterministic() {
        let audio = tone(1600);
        let first = encode_wav(&audio).unwrap();
        let second = encode_wav(&audio).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn round_trips_through_hound() {
        let audio = tone(320);
        let bytes = encode_wav(&audio).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes.to_vec())).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, CANONICAL_SAMPLE_RATE);
        assert_eq!(reader.len() as usize, audio.samples.len());
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let audio = CanonicalAudio::new(vec![2.0, -2.0], CANONICAL_SAMPLE_RATE, Duration::ZERO);
        let bytes = encode_wav(&audio).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes.to_vec())).unwrap();
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![i16::MAX, -i16::MAX]);
    }
}
