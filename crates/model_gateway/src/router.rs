//! Modality-aware model routing.
//!
//! Per request the router runs one primary attempt against the slot chosen
//! by modality, then either accepts the normalized result or, for audio and
//! video only, runs the fallback exactly once: transcription followed by the
//! text slot over the transcript. Text and image requests have no fallback.
//! Every attempt lands in a per-request ledger with a typed outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use triage_core::config::LimitsConfig;
use triage_core::types::{
    AttemptOutcome, BackendKind, CanonicalAudio, Deadline, InferencePayload, Modality,
    ModelAttempt, RequestContext, TriageResult,
};
use triage_core::{Error, InferenceBackend, Result};

use crate::normalizer;
use crate::prompt;
use crate::providers::BackendRegistry;
use crate::wav;

// =============================================================================
// Routing Input
// =============================================================================

/// Pipeline input after validation and media preprocessing.
#[derive(Debug)]
pub enum RoutedInput {
    /// Free-text complaint.
    Text { complaint: String },
    /// Still image plus optional complaint.
    Image {
        complaint: Option<String>,
        bytes: Bytes,
        mime: String,
    },
    /// Audio (or the audio track of a video) plus optional complaint.
    /// `prepared` carries the preprocessing error when normalization did
    /// not produce canonical audio; routing then skips the primary payload
    /// and lets the fallback transition report the failure.
    Audio {
        complaint: Option<String>,
        prepared: Result<CanonicalAudio>,
    },
}

impl RoutedInput {
    fn modality(&self) -> Modality {
        match self {
            Self::Text { .. } => Modality::Text,
            Self::Image { .. } => Modality::Image,
            Self::Audio { .. } => Modality::Audio,
        }
    }
}

/// Routing outcome: the accepted result plus the attempt ledger.
#[derive(Debug)]
pub struct RouteReport {
    pub result: TriageResult,
    pub attempts: Vec<ModelAttempt>,
}

// =============================================================================
// Model Router
// =============================================================================

/// Routes prepared inputs through the backend slots.
pub struct ModelRouter {
    registry: Arc<BackendRegistry>,
    limits: LimitsConfig,
}

impl ModelRouter {
    pub fn new(registry: Arc<BackendRegistry>, limits: LimitsConfig) -> Self {
        Self { registry, limits }
    }

    /// Routes one input to an accepted [`TriageResult`].
    pub async fn route(&self, input: RoutedInput, ctx: &RequestContext) -> Result<RouteReport> {
        let modality = input.modality();
        let mut attempts = Vec::new();
        tracing::debug!(trace_id = %ctx.trace_id, modality = %modality, "Routing request");

        match self.dispatch(input, &mut attempts, ctx).await {
            Ok(result) => {
                tracing::info!(
                    trace_id = %ctx.trace_id,
                    modality = %modality,
                    model = %result.model_used,
                    attempts = attempts.len(),
                    "Routing succeeded"
                );
                Ok(RouteReport { result, attempts })
            }
            Err(e) => {
                let trail: Vec<String> = attempts
                    .iter()
                    .map(|a| format!("{}:{}", a.kind, a.outcome.as_str()))
                    .collect();
                tracing::warn!(
                    trace_id = %ctx.trace_id,
                    modality = %modality,
                    error = %e,
                    trail = ?trail,
                    stats = ?self.registry.stats(),
                    "Routing failed"
                );
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        input: RoutedInput,
        attempts: &mut Vec<ModelAttempt>,
        ctx: &RequestContext,
    ) -> Result<TriageResult> {
        let system = prompt::system_prompt(&ctx.patient);
        match input {
            RoutedInput::Text { complaint } => {
                let payload = InferencePayload::Text {
                    system,
                    prompt: prompt::user_prompt(Some(&complaint), None, &ctx.patient),
                };
                let backend = self.registry.primary(Modality::Text);
                self.attempt(
                    attempts,
                    BackendKind::Text,
                    &backend,
                    payload,
                    ctx,
                    self.limits.primary_timeout(),
                )
                .await
                .map_err(promote_primary)
            }
            RoutedInput::Image {
                complaint,
                bytes,
                mime,
            } => {
                let user = prompt::user_prompt(complaint.as_deref(), None, &ctx.patient);
                let payload = InferencePayload::Image {
                    system,
                    prompt: format!(
                        "{user}\n{}",
                        prompt::media_instruction(complaint.as_deref())
                    ),
                    bytes,
                    mime,
                };
                let backend = self.registry.primary(Modality::Image);
                self.attempt(
                    attempts,
                    BackendKind::Vision,
                    &backend,
                    payload,
                    ctx,
                    self.limits.primary_timeout(),
                )
                .await
                .map_err(promote_primary)
            }
            RoutedInput::Audio {
                complaint,
                prepared,
            } => {
                self.route_audio(attempts, complaint, prepared, system, ctx)
                    .await
            }
        }
    }

    /// Primary audio attempt, then the single fallback pass.
    async fn route_audio(
        &self,
        attempts: &mut Vec<ModelAttempt>,
        complaint: Option<String>,
        prepared: Result<CanonicalAudio>,
        system: String,
        ctx: &RequestContext,
    ) -> Result<TriageResult> {
        let user = prompt::user_prompt(complaint.as_deref(), None, &ctx.patient);

        // Canonical PCM is encoded exactly once; the primary payload and the
        // transcription leg share the same bytes.
        let material: std::result::Result<Bytes, String> = prepared
            .and_then(|audio| wav::encode_wav(&audio))
            .map_err(|e| e.to_string());

        let primary = self.registry.primary(Modality::Audio);
        let wav_bytes = match material {
            Ok(wav_bytes) => {
                let payload = InferencePayload::Audio {
                    system: system.clone(),
                    prompt: format!(
                        "{user}\n{}",
                        prompt::media_instruction(complaint.as_deref())
                    ),
                    wav: wav_bytes.clone(),
                };
                match self
                    .attempt(
                        attempts,
                        BackendKind::AudioChat,
                        &primary,
                        payload,
                        ctx,
                        self.limits.primary_timeout(),
                    )
                    .await
                {
                    Ok(result) => return Ok(result),
                    Err(e) => {
                        tracing::warn!(
                            trace_id = %ctx.trace_id,
                            error = %e,
                            "Primary audio attempt failed; entering fallback"
                        );
                        Ok(wav_bytes)
                    }
                }
            }
            Err(reason) => {
                // Preprocessing failed, so the primary payload cannot be
                // built. The attempt is recorded without a backend call.
                attempts.push(ModelAttempt {
                    kind: BackendKind::AudioChat,
                    model: primary.model_id().to_string(),
                    outcome: AttemptOutcome::Skipped(reason.clone()),
                    elapsed: Duration::ZERO,
                });
                tracing::warn!(
                    trace_id = %ctx.trace_id,
                    reason = %reason,
                    "Audio unavailable; primary attempt skipped"
                );
                Err(reason)
            }
        };

        self.run_fallback(attempts, wav_bytes, complaint.as_deref(), system, ctx)
            .await
    }

    /// The transcription-then-text fallback, run at most once per request.
    async fn run_fallback(
        &self,
        attempts: &mut Vec<ModelAttempt>,
        wav_bytes: std::result::Result<Bytes, String>,
        complaint: Option<&str>,
        system: String,
        ctx: &RequestContext,
    ) -> Result<TriageResult> {
        metrics::counter!("triage_fallbacks_total").increment(1);
        let handle = self.registry.transcription();

        let wav_bytes = match wav_bytes {
            Ok(bytes) => bytes,
            Err(reason) => {
                let message = format!("no canonical audio to transcribe: {reason}");
                attempts.push(ModelAttempt {
                    kind: BackendKind::Transcription,
                    model: handle.model_id().to_string(),
                    outcome: AttemptOutcome::Failed(message.clone()),
                    elapsed: Duration::ZERO,
                });
                return Err(Error::transcription(message));
            }
        };

        let deadline =
            Deadline::within(self.limits.transcription_timeout()).min(ctx.deadline);
        let started = Instant::now();
        let leg = tokio::time::timeout(
            deadline.remaining(),
            handle.transcribe(wav_bytes, ctx, deadline),
        )
        .await;
        let elapsed = started.elapsed();

        let transcript = match leg {
            Err(_) => {
                self.finish_attempt(
                    attempts,
                    BackendKind::Transcription,
                    handle.model_id(),
                    AttemptOutcome::TimedOut,
                    elapsed,
                );
                return Err(Error::transcription("transcription attempt timed out"));
            }
            Ok(Err(e)) => {
                self.finish_attempt(
                    attempts,
                    BackendKind::Transcription,
                    handle.model_id(),
                    AttemptOutcome::Failed(e.to_string()),
                    elapsed,
                );
                return Err(e);
            }
            Ok(Ok(transcript)) => {
                self.finish_attempt(
                    attempts,
                    BackendKind::Transcription,
                    handle.model_id(),
                    AttemptOutcome::Succeeded,
                    elapsed,
                );
                transcript
            }
        };
        tracing::debug!(
            trace_id = %ctx.trace_id,
            chars = transcript.len(),
            "Transcript accepted; routing to text slot"
        );

        let payload = InferencePayload::Text {
            system,
            prompt: prompt::user_prompt(complaint, Some(&transcript), &ctx.patient),
        };
        let backend = self.registry.text();
        self.attempt(
            attempts,
            BackendKind::Text,
            &backend,
            payload,
            ctx,
            self.limits.fallback_timeout(),
        )
        .await
        .map_err(|e| match e {
            Error::Transcription(_) => e,
            other => Error::transcription(format!("fallback text attempt failed: {other}")),
        })
    }

    /// One chat attempt: invoke under a capped deadline, then judge success
    /// after normalization.
    async fn attempt(
        &self,
        attempts: &mut Vec<ModelAttempt>,
        kind: BackendKind,
        backend: &Arc<dyn InferenceBackend>,
        payload: InferencePayload,
        ctx: &RequestContext,
        budget: Duration,
    ) -> Result<TriageResult> {
        let deadline = Deadline::within(budget).min(ctx.deadline);
        let started = Instant::now();
        let invoked = tokio::time::timeout(
            deadline.remaining(),
            backend.invoke(payload, ctx, deadline),
        )
        .await;
        let elapsed = started.elapsed();

        let judged = match invoked {
            Err(_) => Err((
                AttemptOutcome::TimedOut,
                Error::timeout(format!("{kind} attempt timed out")),
            )),
            Ok(Err(e @ Error::Timeout(_))) => Err((AttemptOutcome::TimedOut, e)),
            Ok(Err(e)) => Err((AttemptOutcome::Failed(e.to_string()), e)),
            Ok(Ok(raw)) => match normalizer::normalize(&raw.model, &raw.content) {
                Ok(result) => Ok(result),
                Err(e) => Err((AttemptOutcome::Failed(e.to_string()), e)),
            },
        };

        match judged {
            Ok(result) => {
                self.finish_attempt(
                    attempts,
                    kind,
                    backend.model_id(),
                    AttemptOutcome::Succeeded,
                    elapsed,
                );
                Ok(result)
            }
            Err((outcome, e)) => {
                tracing::warn!(
                    trace_id = %ctx.trace_id,
                    slot = %kind,
                    model = %backend.model_id(),
                    outcome = outcome.as_str(),
                    error = %e,
                    "Model attempt failed"
                );
                self.finish_attempt(attempts, kind, backend.model_id(), outcome, elapsed);
                Err(e)
            }
        }
    }

    fn finish_attempt(
        &self,
        attempts: &mut Vec<ModelAttempt>,
        kind: BackendKind,
        model: &str,
        outcome: AttemptOutcome,
        elapsed: Duration,
    ) {
        metrics::counter!(
            "triage_model_attempts_total",
            "slot" => kind.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        metrics::histogram!("triage_model_attempt_duration_seconds", "slot" => kind.as_str())
            .record(elapsed.as_secs_f64());
        self.registry
            .record_attempt(model, matches!(outcome, AttemptOutcome::Succeeded));
        attempts.push(ModelAttempt {
            kind,
            model: model.to_string(),
            outcome,
            elapsed,
        });
    }
}

/// Primary failures for modalities without a fallback keep their timeout
/// and malformed-response classes; everything else becomes a primary-model
/// error.
fn promote_primary(e: Error) -> Error {
    match e {
        Error::Timeout(_) | Error::MalformedResponse(_) | Error::PrimaryModel(_) => e,
        other => Error::primary_model(other.to_string()),
    }
}
