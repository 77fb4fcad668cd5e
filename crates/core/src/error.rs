//! Error types for the triage pipeline.

use thiserror::Error;

/// Result type alias using the pipeline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable reason for rejecting a request before any model work.
///
/// Surfaced verbatim to the caller, so the identifiers are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    /// Neither text nor an upload was provided.
    NoInput,
    /// Upload exceeds the byte-size cap.
    FileTooLarge,
    /// MIME type outside the supported families or container allow-list.
    UnsupportedMediaType,
    /// Media duration exceeds the cap.
    MediaTooLong,
    /// `patient_age` form value is not a number.
    InvalidPatientAge,
}

impl ValidationReason {
    /// Stable identifier echoed in error responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoInput => "no_input",
            Self::FileTooLarge => "file_too_large",
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::MediaTooLong => "media_too_long",
            Self::InvalidPatientAge => "invalid_patient_age",
        }
    }
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for the triage pipeline.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Pre-flight
    // =========================================================================
    #[error("Request rejected: {0}")]
    Validation(ValidationReason),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Audio preprocessing
    // =========================================================================
    #[error("Unsupported audio: {0}")]
    UnsupportedAudio(String),

    #[error("Audio preprocessing exceeded {budget_ms}ms budget")]
    PreprocessingTimeout { budget_ms: u64 },

    // =========================================================================
    // Model routing
    // =========================================================================
    #[error("Primary model failed: {0}")]
    PrimaryModel(String),

    #[error("Transcription fallback failed: {0}")]
    Transcription(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Too many concurrent triage requests")]
    Overloaded,

    // =========================================================================
    // Ambient
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a validation error.
    pub fn validation(reason: ValidationReason) -> Self {
        Self::Validation(reason)
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an unsupported audio error.
    pub fn unsupported_audio(msg: impl Into<String>) -> Self {
        Self::UnsupportedAudio(msg.into())
    }

    /// Create a primary model error.
    pub fn primary_model(msg: impl Into<String>) -> Self {
        Self::PrimaryModel(msg.into())
    }

    /// Create a transcription error.
    pub fn transcription(msg: impl Into<String>) -> Self {
        Self::Transcription(msg.into())
    }

    /// Create a malformed response error.
    pub fn malformed_response(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP transport error.
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable class label used in metrics and error bodies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedAudio(_) => "unsupported_audio",
            Self::PreprocessingTimeout { .. } => "preprocessing_timeout",
            Self::PrimaryModel(_) => "primary_model",
            Self::Transcription(_) => "transcription",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Timeout(_) => "timeout",
            Self::Overloaded => "overloaded",
            Self::Config(_) => "config",
            Self::Http(_) => "http",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) | Self::Other(_) => "internal",
        }
    }
}
