//! Model API backends and the slot registry.
//!
//! All four slots speak the Mistral wire protocol: chat slots through
//! `/v1/chat/completions` with `response_format: json_object`, the
//! transcription slot through `/v1/audio/transcriptions` as multipart.
//! One shared [`reqwest::Client`] and one API key serve every slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use dashmap::DashMap;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::json;

use triage_core::config::BackendsConfig;
use triage_core::types::{
    BackendKind, Deadline, InferencePayload, Modality, RawResponse, RequestContext,
};
use triage_core::{Error, InferenceBackend, Result};

use crate::transcription::TranscriptionFallback;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionReply {
    model: Option<String>,
    text: String,
}

// =============================================================================
// Mistral Backend
// =============================================================================

/// One model slot behind the Mistral-compatible API.
pub struct MistralBackend {
    kind: BackendKind,
    model: String,
    base_url: String,
    api_key: Option<Secret<String>>,
    http: reqwest::Client,
}

impl MistralBackend {
    pub fn new(
        kind: BackendKind,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<Secret<String>>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            kind,
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            http,
        }
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.kind {
            BackendKind::Transcription => format!("{base}/v1/audio/transcriptions"),
            _ => format!("{base}/v1/chat/completions"),
        }
    }

    fn bearer(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret().as_str())
            .ok_or_else(|| Error::config(format!("no API key for {} backend", self.kind)))
    }

    /// Chat message list for the given payload. Media is inlined: images as
    /// a base64 data URL, audio as a base64 `input_audio` part.
    fn chat_messages(&self, payload: &InferencePayload) -> Result<serde_json::Value> {
        let engine = base64::engine::general_purpose::STANDARD;
        match payload {
            InferencePayload::Text { system, prompt } => Ok(json!([
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ])),
            InferencePayload::Image {
                system,
                prompt,
                bytes,
                mime,
            } => {
                let mime = sniff_image_mime(bytes).unwrap_or(mime.as_str());
                let data_url = format!("data:{mime};base64,{}", engine.encode(bytes));
                Ok(json!([
                    { "role": "system", "content": system },
                    { "role": "user", "content": [
                        { "type": "text", "text": prompt },
                        { "type": "image_url", "image_url": { "url": data_url } },
                    ]},
                ]))
            }
            InferencePayload::Audio {
                system,
                prompt,
                wav,
            } => Ok(json!([
                { "role": "system", "content": system },
                { "role": "user", "content": [
                    { "type": "input_audio", "input_audio": { "data": engine.encode(wav), "format": "wav" } },
                    { "type": "text", "text": prompt },
                ]},
            ])),
            InferencePayload::Transcribe { .. } => Err(Error::internal(
                "transcribe payload sent to a chat slot",
            )),
        }
    }

    async fn chat(&self, payload: &InferencePayload, deadline: Deadline) -> Result<RawResponse> {
        let body = json!({
            "model": self.model,
            "messages": self.chat_messages(payload)?,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.bearer()?)
            .timeout(deadline.remaining())
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&self.model, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(
                model = %self.model,
                status = %status,
                detail = %truncate(&detail, 200),
                "Chat call failed"
            );
            return Err(Error::http(format!("{} returned HTTP {status}", self.model)));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| Error::http(format!("unreadable reply from {}: {e}", self.model)))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                Error::malformed_response(format!("empty completion from {}", self.model))
            })?;

        Ok(RawResponse {
            model: completion.model.unwrap_or_else(|| self.model.clone()),
            content,
        })
    }

    async fn transcribe_call(&self, wav: &Bytes, deadline: Deadline) -> Result<RawResponse> {
        let part = reqwest::multipart::Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::internal(format!("failed to build multipart: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.bearer()?)
            .timeout(deadline.remaining())
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_transport(&self.model, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(
                model = %self.model,
                status = %status,
                detail = %truncate(&detail, 200),
                "Transcription call failed"
            );
            return Err(Error::http(format!("{} returned HTTP {status}", self.model)));
        }

        let reply: TranscriptionReply = response
            .json()
            .await
            .map_err(|e| Error::http(format!("unreadable reply from {}: {e}", self.model)))?;

        Ok(RawResponse {
            model: reply.model.unwrap_or_else(|| self.model.clone()),
            content: reply.text,
        })
    }
}

#[async_trait]
impl InferenceBackend for MistralBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn invoke(
        &self,
        payload: InferencePayload,
        ctx: &RequestContext,
        deadline: Deadline,
    ) -> Result<RawResponse> {
        tracing::debug!(
            trace_id = %ctx.trace_id,
            model = %self.model,
            slot = %self.kind,
            "Invoking backend"
        );
        match &payload {
            InferencePayload::Transcribe { wav } => self.transcribe_call(wav, deadline).await,
            _ => self.chat(&payload, deadline).await,
        }
    }
}

/// Maps a transport failure onto the pipeline error classes.
fn classify_transport(model: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(format!("{model} call timed out"))
    } else {
        Error::http(format!("{model} call failed: {e}"))
    }
}

/// MIME type from image magic bytes; falls back to the declared type when
/// the format is not recognized.
fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// =============================================================================
// Backend Registry
// =============================================================================

/// Configuration state of the four slots, as reported by `/health`.
#[derive(Debug, Clone, Copy)]
pub struct SlotHealth {
    pub text_configured: bool,
    pub vision_configured: bool,
    pub audio_configured: bool,
    pub transcription_configured: bool,
}

/// Process-lifetime attempt counters for one model.
#[derive(Debug, Default)]
pub struct SlotStats {
    /// Total attempts against the model.
    pub invocations: AtomicU64,
    /// Attempts that did not produce an accepted answer.
    pub failures: AtomicU64,
}

impl SlotStats {
    pub fn failure_rate(&self) -> f64 {
        let total = self.invocations.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            self.failures.load(Ordering::Relaxed) as f64 / total as f64
        }
    }
}

/// The four model slots a request can route to.
///
/// Text, vision, and audio-chat slots are constructed eagerly; the
/// transcription slot stays behind its lazy [`TranscriptionFallback`] handle.
pub struct BackendRegistry {
    text: Arc<dyn InferenceBackend>,
    vision: Arc<dyn InferenceBackend>,
    audio: Arc<dyn InferenceBackend>,
    transcription: TranscriptionFallback,
    transcription_key_present: bool,
    stats: DashMap<String, SlotStats>,
}

impl BackendRegistry {
    /// Builds all slots against the configured API.
    pub fn from_config(cfg: &BackendsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {e}")))?;

        let slot = |kind: BackendKind, model: &str| -> Arc<dyn InferenceBackend> {
            Arc::new(MistralBackend::new(
                kind,
                model,
                cfg.base_url.clone(),
                cfg.api_key.clone(),
                http.clone(),
            ))
        };

        let transcription = {
            let cfg = cfg.clone();
            let http = http.clone();
            TranscriptionFallback::new(cfg.transcription_model.clone(), move || {
                if cfg.api_key.is_none() {
                    return Err(Error::config("no API key for transcription backend"));
                }
                Ok(Arc::new(MistralBackend::new(
                    BackendKind::Transcription,
                    cfg.transcription_model.clone(),
                    cfg.base_url.clone(),
                    cfg.api_key.clone(),
                    http.clone(),
                )) as Arc<dyn InferenceBackend>)
            })
        };

        Ok(Self {
            text: slot(BackendKind::Text, &cfg.text_model),
            vision: slot(BackendKind::Vision, &cfg.vision_model),
            audio: slot(BackendKind::AudioChat, &cfg.audio_model),
            transcription,
            transcription_key_present: cfg.api_key.is_some(),
            stats: DashMap::new(),
        })
    }

    /// Assembles a registry from pre-built slots. Used by tests.
    pub fn with_slots(
        text: Arc<dyn InferenceBackend>,
        vision: Arc<dyn InferenceBackend>,
        audio: Arc<dyn InferenceBackend>,
        transcription: TranscriptionFallback,
    ) -> Self {
        let transcription_key_present = transcription
            .peek()
            .map(|backend| backend.configured())
            .unwrap_or(false);
        Self {
            text,
            vision,
            audio,
            transcription,
            transcription_key_present,
            stats: DashMap::new(),
        }
    }

    /// The primary slot for a modality. Audio and video share the
    /// audio-chat slot.
    pub fn primary(&self, modality: Modality) -> Arc<dyn InferenceBackend> {
        match modality {
            Modality::Text => Arc::clone(&self.text),
            Modality::Image => Arc::clone(&self.vision),
            Modality::Audio | Modality::Video => Arc::clone(&self.audio),
        }
    }

    /// The text slot, which also serves the fallback leg.
    pub fn text(&self) -> Arc<dyn InferenceBackend> {
        Arc::clone(&self.text)
    }

    /// The lazy transcription handle.
    pub fn transcription(&self) -> &TranscriptionFallback {
        &self.transcription
    }

    /// Records one attempt against a model.
    pub fn record_attempt(&self, model: &str, success: bool) {
        let entry = self.stats.entry(model.to_string()).or_default();
        entry.invocations.fetch_add(1, Ordering::Relaxed);
        if !success {
            entry.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of per-model counters as `(model, invocations, failures)`.
    pub fn stats(&self) -> Vec<(String, u64, u64)> {
        self.stats
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().invocations.load(Ordering::Relaxed),
                    entry.value().failures.load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    /// Per-slot configuration flags.
    pub fn health(&self) -> SlotHealth {
        let transcription_configured = self
            .transcription
            .peek()
            .map(|backend| backend.configured())
            .unwrap_or(self.transcription_key_present);
        SlotHealth {
            text_configured: self.text.configured(),
            vision_configured: self.vision.configured(),
            audio_configured: self.audio.configured(),
            transcription_configured,
        }
    }
}
