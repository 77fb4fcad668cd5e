use std::time::Duration;

/// Sample rate every normalized waveform is resampled to (Hz).
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Decoded audio in canonical form: mono, 16 kHz, f32 linear PCM.
///
/// Produced once per request by the audio normalizer and consumed by both
/// the audio-native backend payload and the transcription fallback. For a
/// given input byte stream the sample vector is identical across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalAudio {
    /// Mono samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Always [`CANONICAL_SAMPLE_RATE`] after normalization.
    pub sample_rate: u32,
    /// Duration of the decoded source, measured before resampling.
    pub source_duration: Duration,
}

impl CanonicalAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, source_duration: Duration) -> Self {
        Self {
            samples,
            sample_rate,
            source_duration,
        }
    }

    /// Duration of the canonical waveform.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_derives_from_sample_count() {
        let audio = CanonicalAudio::new(
            vec![0.0; CANONICAL_SAMPLE_RATE as usize * 2],
            CANONICAL_SAMPLE_RATE,
            Duration::from_secs(2),
        );
        assert_eq!(audio.duration(), Duration::from_secs(2));
    }

    #[test]
    fn zero_rate_audio_has_zero_duration() {
        let audio = CanonicalAudio::new(vec![0.5; 100], 0, Duration::ZERO);
        assert_eq!(audio.duration(), Duration::ZERO);
    }
}
