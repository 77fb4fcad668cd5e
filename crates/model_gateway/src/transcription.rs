//! Lazy transcription fallback handle.
//!
//! The speech-to-text backend is only needed when an audio-native attempt
//! fails, so it is constructed on first use. Initialization runs at most
//! once under contention; a failed construction is not cached and the next
//! request retries it.

use std::sync::Arc;

use tokio::sync::OnceCell;
use triage_core::types::{Deadline, InferencePayload, RequestContext};
use triage_core::{Error, InferenceBackend, Result};

type BackendFactory = Box<dyn Fn() -> Result<Arc<dyn InferenceBackend>> + Send + Sync>;

/// Shared handle to the lazily constructed transcription backend.
pub struct TranscriptionFallback {
    model_hint: String,
    factory: BackendFactory,
    cell: OnceCell<Arc<dyn InferenceBackend>>,
}

impl TranscriptionFallback {
    /// A handle that builds its backend on first use.
    ///
    /// `model_hint` is the configured model identifier, used for logs and
    /// the attempt ledger before (or instead of) a successful build.
    pub fn new<F>(model_hint: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn InferenceBackend>> + Send + Sync + 'static,
    {
        Self {
            model_hint: model_hint.into(),
            factory: Box::new(factory),
            cell: OnceCell::new(),
        }
    }

    /// A handle around an already constructed backend. Used by tests and
    /// by registries assembled from parts.
    pub fn preloaded(backend: Arc<dyn InferenceBackend>) -> Self {
        let model_hint = backend.model_id().to_string();
        let cell = OnceCell::new();
        // A fresh cell accepts exactly one value.
        let _ = cell.set(backend);
        Self {
            model_hint,
            factory: Box::new(|| {
                Err(Error::transcription("preloaded handle has no factory"))
            }),
            cell,
        }
    }

    /// Configured model identifier, independent of initialization state.
    pub fn model_id(&self) -> &str {
        &self.model_hint
    }

    /// Whether the backend has been constructed.
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// The constructed backend, without triggering initialization.
    pub fn peek(&self) -> Option<Arc<dyn InferenceBackend>> {
        self.cell.get().cloned()
    }

    /// The transcription backend, constructing it on first call.
    ///
    /// Concurrent callers share one construction; only the winner's factory
    /// runs. When the factory fails the error is returned and the cell stays
    /// empty, so a later call retries.
    pub async fn backend(&self) -> Result<Arc<dyn InferenceBackend>> {
        let initialized = self.cell.initialized();
        let backend = self
            .cell
            .get_or_try_init(|| async { (self.factory)() })
            .await
            .map_err(|e| match e {
                Error::Transcription(_) => e,
                other => Error::transcription(format!(
                    "transcription backend unavailable: {other}"
                )),
            })?;
        if !initialized {
            tracing::info!(model = %backend.model_id(), "Transcription backend initialized");
        }
        Ok(Arc::clone(backend))
    }

    /// Transcribes a 16-bit WAV buffer, rejecting empty transcripts.
    pub async fn transcribe(
        &self,
        wav: bytes::Bytes,
        ctx: &RequestContext,
        deadline: Deadline,
    ) -> Result<String> {
        let backend = self.backend().await?;
        let raw = backend
            .invoke(InferencePayload::Transcribe { wav }, ctx, deadline)
            .await
            .map_err(|e| match e {
                Error::Transcription(_) => e,
                other => Error::transcription(other.to_string()),
            })?;

        let transcript = raw.content.trim().to_string();
        if transcript.is_empty() {
            return Err(Error::transcription(format!(
                "empty transcript from {}",
                raw.model
            )));
        }
        Ok(transcript)
    }
}

impl std::fmt::Debug for TranscriptionFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionFallback")
            .field("model_hint", &self.model_hint)
            .field("initialized", &self.cell.initialized())
            .finish()
    }
}
