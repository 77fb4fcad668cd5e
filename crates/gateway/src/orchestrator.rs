//! End-to-end triage orchestration.
//!
//! One orchestrator instance owns the validation gate, the audio
//! normalizer, the model router, and the concurrency limiter. `handle`
//! runs a parsed request through all of them under the end-to-end
//! deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use triage_core::config::LimitsConfig;
use triage_core::types::{Deadline, Modality, RequestContext, TriageRequest, TriageResult};
use triage_core::{Error, Result, ValidationReason};
use triage_model_gateway::{ModelRouter, RoutedInput};

use crate::audio::AudioNormalizer;
use crate::validation::ValidationGate;

/// Runs triage requests through validation, preprocessing, and routing.
pub struct TriageOrchestrator {
    gate: ValidationGate,
    normalizer: AudioNormalizer,
    router: ModelRouter,
    limiter: Arc<Semaphore>,
    request_deadline: Duration,
}

impl TriageOrchestrator {
    pub fn new(limits: &LimitsConfig, router: ModelRouter) -> Self {
        Self {
            gate: ValidationGate::from_limits(limits),
            normalizer: AudioNormalizer::from_limits(limits),
            router,
            limiter: Arc::new(Semaphore::new(limits.max_concurrency)),
            request_deadline: limits.request_deadline(),
        }
    }

    /// Runs one request end to end.
    ///
    /// Admission is non-blocking: a request that finds no free slot is
    /// rejected immediately rather than queued.
    pub async fn handle(&self, request: TriageRequest) -> Result<TriageResult> {
        let _permit = self
            .limiter
            .try_acquire()
            .map_err(|_| Error::Overloaded)?;

        let trace_id = request.trace_id.clone();
        let modality = request
            .modality()
            .map(|m| m.as_str())
            .unwrap_or("unknown");
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.request_deadline, self.execute(request)).await;
        let elapsed = started.elapsed();

        let result = match outcome {
            Err(_) => Err(Error::timeout("triage deadline exceeded")),
            Ok(result) => result,
        };

        let outcome_label = match &result {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::counter!(
            "triage_requests_total",
            "modality" => modality,
            "outcome" => outcome_label
        )
        .increment(1);
        metrics::histogram!("triage_request_duration_seconds").record(elapsed.as_secs_f64());

        match &result {
            Ok(result) => {
                tracing::info!(
                    trace_id = %trace_id,
                    score = result.severity_score,
                    level = %result.severity_level,
                    model = %result.model_used,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Triage complete"
                );
            }
            Err(e) => {
                tracing::warn!(
                    trace_id = %trace_id,
                    class = e.label(),
                    error = %e,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Triage failed"
                );
            }
        }
        result
    }

    async fn execute(&self, request: TriageRequest) -> Result<TriageResult> {
        self.gate.validate(&request)?;

        let ctx = RequestContext {
            trace_id: request.trace_id.clone(),
            patient: request.patient.clone(),
            deadline: Deadline::within(self.request_deadline),
        };

        let input = self.prepare(request).await?;
        let report = self.router.route(input, &ctx).await?;
        Ok(report.result)
    }

    /// Builds the routing input. Audio and video normalize here; a
    /// preprocessing failure rides along inside the input so routing can
    /// record the skipped primary attempt instead of the request dying
    /// before the ledger exists.
    async fn prepare(&self, request: TriageRequest) -> Result<RoutedInput> {
        let complaint = request
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(String::from);

        let Some(asset) = request.asset else {
            // The gate guarantees text is present when there is no upload.
            return Ok(RoutedInput::Text {
                complaint: complaint.unwrap_or_default(),
            });
        };

        match Modality::from_mime(&asset.mime_type) {
            Some(Modality::Image) => Ok(RoutedInput::Image {
                complaint,
                mime: asset.mime_type.clone(),
                bytes: asset.bytes,
            }),
            Some(modality) if modality.has_audio_track() => {
                let prepared = match self.normalizer.normalize(&asset).await {
                    Ok(audio) => Ok(audio),
                    Err(e @ (Error::UnsupportedAudio(_) | Error::PreprocessingTimeout { .. })) => {
                        Err(e)
                    }
                    Err(e) => return Err(e),
                };
                Ok(RoutedInput::Audio { complaint, prepared })
            }
            // The gate already rejected unknown MIME families.
            _ => Err(Error::validation(ValidationReason::UnsupportedMediaType)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use triage_core::mocks::{scripted_triage_json, MockBackend};
    use triage_core::types::MediaAsset;
    use triage_core::InferenceBackend;
    use triage_model_gateway::{BackendRegistry, TranscriptionFallback};

    struct Slots {
        text: Arc<MockBackend>,
        audio_chat: Arc<MockBackend>,
        stt: Arc<MockBackend>,
    }

    fn orchestrator(limits: LimitsConfig, text: MockBackend) -> (TriageOrchestrator, Slots) {
        let slots = Slots {
            text: Arc::new(text),
            audio_chat: Arc::new(MockBackend::constant("voxtral-small-latest", "{}")),
            stt: Arc::new(MockBackend::constant("voxtral-mini-latest", "transcript")),
        };
        let registry = Arc::new(BackendRegistry::with_slots(
            Arc::clone(&slots.text) as Arc<dyn InferenceBackend>,
            Arc::new(MockBackend::constant(
                "pixtral-large-latest",
                &scripted_triage_json(40, "stub", "stub"),
            )),
            Arc::clone(&slots.audio_chat) as Arc<dyn InferenceBackend>,
            TranscriptionFallback::preloaded(
                Arc::clone(&slots.stt) as Arc<dyn InferenceBackend>
            ),
        ));
        let router = ModelRouter::new(registry, limits.clone());
        (TriageOrchestrator::new(&limits, router), slots)
    }

    #[tokio::test]
    async fn text_request_completes_with_a_normalized_result() {
        let (orchestrator, slots) = orchestrator(
            LimitsConfig::default(),
            MockBackend::constant(
                "mistral-large-latest",
                &scripted_triage_json(85, "Suspected ACS", "Emergency Department"),
            ),
        );

        let result = orchestrator
            .handle(TriageRequest::text("chest pain, shortness of breath"))
            .await
            .unwrap();

        assert_eq!(result.severity_score, 85);
        assert_eq!(result.severity_level.as_str(), "High");
        assert_eq!(result.model_used, "mistral-large-latest");
        assert_eq!(slots.text.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_request_is_rejected_before_any_backend_call() {
        let (orchestrator, slots) = orchestrator(
            LimitsConfig::default(),
            MockBackend::constant("mistral-large-latest", "{}"),
        );

        let err = orchestrator.handle(TriageRequest::new()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Validation(ValidationReason::NoInput)
        ));
        assert_eq!(slots.text.call_count(), 0);
        assert_eq!(slots.audio_chat.call_count(), 0);
        assert_eq!(slots.stt.call_count(), 0);
    }

    #[tokio::test]
    async fn undecodable_audio_skips_every_backend() {
        let (orchestrator, slots) = orchestrator(
            LimitsConfig::default(),
            MockBackend::constant("mistral-large-latest", "{}"),
        );

        let request = TriageRequest::new().with_asset(MediaAsset::new(
            "audio/wav",
            Bytes::from_static(b"not a riff container at all"),
        ));
        let err = orchestrator.handle(request).await.unwrap_err();

        assert!(matches!(err, Error::Transcription(_)), "got {err}");
        assert_eq!(slots.audio_chat.call_count(), 0);
        assert_eq!(slots.stt.call_count(), 0);
        assert_eq!(slots.text.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_limiter_rejects_with_overloaded() {
        let limits = LimitsConfig {
            max_concurrency: 1,
            ..LimitsConfig::default()
        };
        let (orchestrator, _slots) =
            orchestrator(limits, MockBackend::hanging("mistral-large-latest"));
        let orchestrator = Arc::new(orchestrator);

        let first = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.handle(TriageRequest::text("chest pain")).await }
        });
        // Let the first request claim the only permit.
        tokio::task::yield_now().await;

        let err = orchestrator
            .handle(TriageRequest::text("sore throat"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Overloaded));
        first.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_overrun_surfaces_as_timeout() {
        let limits = LimitsConfig {
            request_deadline_ms: 50,
            ..LimitsConfig::default()
        };
        let (orchestrator, _slots) =
            orchestrator(limits, MockBackend::hanging("mistral-large-latest"));

        let err = orchestrator
            .handle(TriageRequest::text("chest pain"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got {err}");
    }
}
