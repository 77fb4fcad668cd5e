//! Audio normalization.
//!
//! Converts supported audio uploads (and the audio track of video
//! containers) into canonical mono 16 kHz f32 PCM. Decoding runs on the
//! blocking pool under a bounded budget; exceeding the budget is a
//! preprocessing timeout, which routing treats as a primary-path failure.
//! For a given input byte stream the output sample vector is identical
//! across runs.

use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use triage_core::config::LimitsConfig;
use triage_core::types::{CanonicalAudio, MediaAsset, CANONICAL_SAMPLE_RATE};
use triage_core::{Error, Result};

/// Decodes uploads into [`CanonicalAudio`] on the blocking pool.
#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    budget: Duration,
}

impl AudioNormalizer {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.preprocessing_budget())
    }

    /// Normalizes one upload.
    ///
    /// A decode that outlives the budget keeps running detached on its
    /// blocking thread; the request moves on without it.
    pub async fn normalize(&self, asset: &MediaAsset) -> Result<CanonicalAudio> {
        let bytes = asset.bytes.clone();
        let hint = extension_hint(&asset.mime_type, asset.file_name.as_deref());
        let work =
            tokio::task::spawn_blocking(move || decode_to_canonical(&bytes, hint.as_deref()));

        match tokio::time::timeout(self.budget, work).await {
            Err(_) => Err(Error::PreprocessingTimeout {
                budget_ms: self.budget.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(Error::internal(format!("audio decode task failed: {e}"))),
            Ok(Ok(decoded)) => decoded,
        }
    }
}

/// Extension hint for the probe: file extension when present, otherwise the
/// declared container.
fn extension_hint(mime: &str, file_name: Option<&str>) -> Option<String> {
    if let Some((_, ext)) = file_name.and_then(|name| name.rsplit_once('.')) {
        if !ext.is_empty() {
            return Some(ext.to_ascii_lowercase());
        }
    }

    let mime = mime.split(';').next().unwrap_or("").trim();
    let (_, container) = mime.split_once('/')?;
    let container = container.to_ascii_lowercase();
    let ext = match container.strip_prefix("x-").unwrap_or(&container) {
        "mpeg" | "mp3" => "mp3",
        "wav" | "wave" => "wav",
        "mp4" => "mp4",
        "ogg" => "ogg",
        "webm" => "webm",
        _ => return None,
    };
    Some(ext.to_string())
}

fn decode_to_canonical(bytes: &[u8], ext: Option<&str>) -> Result<CanonicalAudio> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::unsupported_audio(format!("probe failed: {e}")))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| Error::unsupported_audio("no audio track found"))?;
    let track_id = track.id;
    let src_rate = track
        .codec_params
        .sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| Error::unsupported_audio("unknown sample rate"))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .filter(|count| *count > 0)
        .ok_or_else(|| Error::unsupported_audio("unknown channel count"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::unsupported_audio(format!("no decoder for track: {e}")))?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(Error::unsupported_audio(format!("packet read failed: {e}")));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Recoverable corruption; keep the stream going.
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(error = %e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(Error::unsupported_audio(format!("decode failed: {e}"))),
        };

        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buf.samples());
    }

    if interleaved.is_empty() {
        return Err(Error::unsupported_audio("no audio samples decoded"));
    }

    let frames = interleaved.len() / channels;
    let source_duration = Duration::from_secs_f64(frames as f64 / f64::from(src_rate));
    let mono = downmix_mean(&interleaved, channels);
    let samples = resample_linear(&mono, src_rate, CANONICAL_SAMPLE_RATE);
    Ok(CanonicalAudio::new(
        samples,
        CANONICAL_SAMPLE_RATE,
        source_duration,
    ))
}

/// Arithmetic mean across channels, frame by frame.
fn downmix_mean(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let start = frame * channels;
        let sum: f32 = interleaved[start..start + channels].iter().sum();
        mono.push(sum / channels as f32);
    }
    mono
}

/// Deterministic linear-interpolation resampling of a mono buffer.
fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(dst_rate) / f64::from(src_rate);
    let out_len = (samples.len() as f64 * ratio).ceil() as usize;
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 / ratio;
        let lo = (pos.floor() as usize).min(last);
        let hi = (lo + 1).min(last);
        let frac = (pos - lo as f64) as f32;
        out.push(samples[lo] + frac * (samples[hi] - samples[lo]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn wav_fixture(rate: u32, channels: u16, frames: usize) -> Bytes {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            let value = ((i as f32 * 0.05).sin() * 8_000.0) as i16;
            for ch in 0..channels {
                writer.write_sample(value.saturating_add(ch as i16 * 100)).unwrap();
            }
        }
        writer.finalize().unwrap();
        Bytes::from(cursor.into_inner())
    }

    fn normalizer() -> AudioNormalizer {
        AudioNormalizer::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn stereo_becomes_mono_at_the_canonical_rate() {
        let asset = MediaAsset::new("audio/wav", wav_fixture(44_100, 2, 44_100));
        let audio = normalizer().normalize(&asset).await.unwrap();

        assert_eq!(audio.sample_rate, CANONICAL_SAMPLE_RATE);
        // One second of source audio, within one frame of rounding.
        let n = audio.samples.len() as i64;
        assert!((n - 16_000).abs() <= 2, "unexpected sample count {n}");
        assert!((audio.source_duration.as_secs_f64() - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn output_is_deterministic_for_the_same_bytes() {
        let asset = MediaAsset::new("audio/wav", wav_fixture(22_050, 1, 11_025));
        let first = normalizer().normalize(&asset).await.unwrap();
        let second = normalizer().normalize(&asset).await.unwrap();
        assert_eq!(first.samples, second.samples);
    }

    #[tokio::test]
    async fn undecodable_bytes_are_unsupported() {
        let asset = MediaAsset::new(
            "audio/wav",
            Bytes::from_static(b"definitely not a media container"),
        );
        let err = normalizer().normalize(&asset).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedAudio(_)), "got {err}");
    }

    #[tokio::test]
    async fn exhausted_budget_is_a_preprocessing_timeout() {
        let asset = MediaAsset::new("audio/wav", wav_fixture(16_000, 1, 16_000));
        let err = AudioNormalizer::new(Duration::ZERO)
            .normalize(&asset)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PreprocessingTimeout { .. }), "got {err}");
    }

    #[test]
    fn downmix_averages_the_channels() {
        let mono = downmix_mean(&[0.2, 0.4, -0.2, -0.4], 2);
        assert_eq!(mono, vec![0.3, -0.3]);
    }

    #[test]
    fn resampling_halves_and_doubles() {
        let samples: Vec<f32> = (0..64).map(|i| (i as f32 * 0.1).sin()).collect();
        assert_eq!(resample_linear(&samples, 32_000, 16_000).len(), 32);
        assert_eq!(resample_linear(&samples, 16_000, 32_000).len(), 128);
        assert_eq!(resample_linear(&samples, 16_000, 16_000).len(), 64);
    }

    #[test]
    fn extension_hint_prefers_the_file_name() {
        assert_eq!(
            extension_hint("audio/mpeg", Some("visit.WAV")).as_deref(),
            Some("wav")
        );
        assert_eq!(extension_hint("audio/mpeg", None).as_deref(), Some("mp3"));
        assert_eq!(extension_hint("audio/x-wav", None).as_deref(), Some("wav"));
        assert_eq!(extension_hint("video/webm", None).as_deref(), Some("webm"));
        assert_eq!(extension_hint("application/pdf", None), None);
    }
}
