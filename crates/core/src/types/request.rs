use super::attempt::Deadline;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Request Types
// =============================================================================

/// Input modality, derived from the declared MIME type of the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    /// Free text only.
    Text,
    /// Still image.
    Image,
    /// Audio recording.
    Audio,
    /// Video; only its audio track is consumed.
    Video,
}

impl Modality {
    /// Classify a declared MIME type. `None` for families the pipeline
    /// does not understand.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.split('/').next().unwrap_or("") {
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// Whether this modality carries an audio track.
    pub fn has_audio_track(&self) -> bool {
        matches!(self, Self::Audio | Self::Video)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded media asset, exactly as received.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    /// Original file name, when the client sent one.
    pub file_name: Option<String>,
    /// Declared MIME type of the multipart field.
    pub mime_type: String,
    /// Raw bytes of the upload.
    pub bytes: Bytes,
}

impl MediaAsset {
    pub fn new(mime_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: None,
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Attach the client-supplied file name.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Byte length of the upload.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Structured patient context accompanying a triage request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientContext {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub vital_signs: Option<String>,
    pub medical_history: Option<String>,
    pub current_medications: Option<String>,
    pub allergies: Option<String>,
}

impl PatientContext {
    /// True when no field was provided.
    pub fn is_empty(&self) -> bool {
        self.age.is_none()
            && self.gender.is_none()
            && self.vital_signs.is_none()
            && self.medical_history.is_none()
            && self.current_medications.is_none()
            && self.allergies.is_none()
    }
}

/// A triage request after multipart parsing, before validation.
#[derive(Debug, Clone)]
pub struct TriageRequest {
    /// Unique trace ID for this request.
    pub trace_id: String,
    /// Free-text complaint, trimmed; `None` when empty.
    pub text: Option<String>,
    /// Uploaded media asset, if any.
    pub asset: Option<MediaAsset>,
    /// Structured patient context.
    pub patient: PatientContext,
}

impl TriageRequest {
    /// Create an empty request with a fresh trace id.
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            text: None,
            asset: None,
            patient: PatientContext::default(),
        }
    }

    /// Create a text-only request.
    pub fn text(content: impl Into<String>) -> Self {
        let mut request = Self::new();
        request.text = Some(content.into());
        request
    }

    /// Attach an uploaded asset.
    pub fn with_asset(mut self, asset: MediaAsset) -> Self {
        self.asset = Some(asset);
        self
    }

    /// Attach patient context.
    pub fn with_patient(mut self, patient: PatientContext) -> Self {
        self.patient = patient;
        self
    }

    /// Modality the request routes under. Assets win over text; `None`
    /// when the asset's MIME family is not understood.
    pub fn modality(&self) -> Option<Modality> {
        match &self.asset {
            Some(asset) => Modality::from_mime(&asset.mime_type),
            None => Some(Modality::Text),
        }
    }
}

impl Default for TriageRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request context handed to every backend invocation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Trace ID carried through logs and the attempt ledger.
    pub trace_id: String,
    /// Structured patient context for prompt assembly.
    pub patient: PatientContext,
    /// End-to-end deadline; per-attempt budgets are capped by it.
    pub deadline: Deadline,
}
