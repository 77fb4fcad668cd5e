//! Pre-flight request validation.
//!
//! The gate runs before any model work and performs no backend calls. Checks
//! run in a fixed order: input presence, upload size, MIME allow-list,
//! media duration. The first failure wins and its reason is surfaced
//! verbatim to the caller.

use std::time::Duration;

use triage_core::config::LimitsConfig;
use triage_core::types::{MediaAsset, Modality, TriageRequest};
use triage_core::{Error, Result, ValidationReason};

/// Container families accepted for audio and video uploads.
const ALLOWED_CONTAINERS: &[&str] = &["mpeg", "wav", "mp4", "ogg", "webm"];

/// Pre-flight validation of triage requests.
#[derive(Debug, Clone)]
pub struct ValidationGate {
    max_upload_bytes: usize,
    max_media_duration: Duration,
}

impl ValidationGate {
    pub fn new(max_upload_bytes: usize, max_media_duration: Duration) -> Self {
        Self {
            max_upload_bytes,
            max_media_duration,
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.max_upload_bytes, limits.max_media_duration())
    }

    /// Validates a parsed request. Check order is fixed; the first failing
    /// check determines the reason.
    pub fn validate(&self, request: &TriageRequest) -> Result<()> {
        let text = request
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let asset = request.asset.as_ref().filter(|a| !a.is_empty());

        // 1. Presence: whitespace-only text and empty uploads count as absent.
        if text.is_none() && asset.is_none() {
            return Err(Error::validation(ValidationReason::NoInput));
        }

        let Some(asset) = asset else {
            return Ok(());
        };

        // 2. Size, before looking at the MIME type.
        if asset.len() > self.max_upload_bytes {
            return Err(Error::validation(ValidationReason::FileTooLarge));
        }

        // 3. MIME family and container allow-list. Images are exempt from
        //    the container list.
        let (_, container) = split_mime(&asset.mime_type);
        match Modality::from_mime(&asset.mime_type) {
            Some(Modality::Image) => return Ok(()),
            Some(Modality::Audio) | Some(Modality::Video) => {
                if !container_allowed(container) {
                    return Err(Error::validation(ValidationReason::UnsupportedMediaType));
                }
            }
            Some(Modality::Text) | None => {
                return Err(Error::validation(ValidationReason::UnsupportedMediaType));
            }
        }

        // 4. Duration, only where the header makes it cheap.
        if let Some(duration) = probe_duration(asset) {
            if duration > self.max_media_duration {
                return Err(Error::validation(ValidationReason::MediaTooLong));
            }
        }

        Ok(())
    }
}

/// Splits a declared MIME type into family and bare container, dropping any
/// parameters (`audio/wav; codecs=1` -> `("audio", "wav")`).
fn split_mime(mime: &str) -> (&str, &str) {
    let mime = mime.split(';').next().unwrap_or("").trim();
    match mime.split_once('/') {
        Some((family, container)) => (family, container),
        None => (mime, ""),
    }
}

/// Whether a container subtype is on the allow-list, after normalizing
/// vendor spellings (`x-wav`, `wave`, `mp3`).
fn container_allowed(container: &str) -> bool {
    let container = container.to_ascii_lowercase();
    let container = container.strip_prefix("x-").unwrap_or(&container);
    let container = match container {
        "mp3" => "mpeg",
        "wave" => "wav",
        other => other,
    };
    ALLOWED_CONTAINERS.contains(&container)
}

/// Duration from the WAV header: declared data-chunk length over byte rate.
/// `None` for containers that would need demuxing to measure.
fn probe_duration(asset: &MediaAsset) -> Option<Duration> {
    let (_, container) = split_mime(&asset.mime_type);
    if !matches!(
        container.to_ascii_lowercase().as_str(),
        "wav" | "x-wav" | "wave"
    ) {
        return None;
    }
    probe_wav_duration(&asset.bytes)
}

fn probe_wav_duration(bytes: &[u8]) -> Option<Duration> {
    if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut offset = 12;
    let mut byte_rate: Option<u32> = None;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().ok()?) as usize;
        match id {
            b"fmt " if offset + 20 <= bytes.len() => {
                byte_rate = Some(u32::from_le_bytes(
                    bytes[offset + 16..offset + 20].try_into().ok()?,
                ));
            }
            b"data" => {
                let rate = byte_rate?;
                if rate == 0 {
                    return None;
                }
                return Some(Duration::from_secs_f64(size as f64 / f64::from(rate)));
            }
            _ => {}
        }
        // Chunks are word-aligned.
        offset += 8 + size + (size & 1);
    }
    None
}
