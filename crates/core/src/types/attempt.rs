use bytes::Bytes;
use std::time::{Duration, Instant};

// =============================================================================
// Routing Types
// =============================================================================

/// The four model slots a request can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Text chat model; also serves the fallback leg.
    Text,
    /// Vision chat model.
    Vision,
    /// Audio-native chat model.
    AudioChat,
    /// Speech-to-text model.
    Transcription,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::AudioChat => "audio_chat",
            Self::Transcription => "transcription",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to send to a backend.
#[derive(Debug, Clone)]
pub enum InferencePayload {
    /// Chat over the assembled clinical prompt.
    Text { system: String, prompt: String },
    /// Chat with an attached image.
    Image {
        system: String,
        prompt: String,
        bytes: Bytes,
        mime: String,
    },
    /// Chat with attached canonical audio, encoded as 16-bit WAV.
    Audio {
        system: String,
        prompt: String,
        wav: Bytes,
    },
    /// Speech-to-text over canonical audio, encoded as 16-bit WAV.
    Transcribe { wav: Bytes },
}

/// Raw, un-normalized output of one backend invocation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Identifier of the model that produced the output.
    pub model: String,
    /// Message text as returned by the model: JSON, prose, or a transcript.
    pub content: String,
}

/// Typed outcome of one backend attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The backend answered and the answer normalized cleanly.
    Succeeded,
    /// The attempt exceeded its deadline.
    TimedOut,
    /// The backend failed or returned unusable output.
    Failed(String),
    /// The attempt never reached the backend.
    Skipped(String),
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::TimedOut => "timed_out",
            Self::Failed(_) => "failed",
            Self::Skipped(_) => "skipped",
        }
    }
}

/// One entry in the per-request attempt ledger.
#[derive(Debug, Clone)]
pub struct ModelAttempt {
    /// Which slot was attempted.
    pub kind: BackendKind,
    /// Model identifier behind the slot.
    pub model: String,
    /// Outcome of the attempt.
    pub outcome: AttemptOutcome,
    /// Wall time spent on the attempt.
    pub elapsed: Duration,
}

/// Absolute deadline for a unit of work.
///
/// Attempt deadlines are built from their per-attempt budget and capped by
/// the request deadline with [`Deadline::min`].
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn within(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// The earlier of two deadlines.
    pub fn min(self, other: Deadline) -> Self {
        Self {
            at: self.at.min(other.at),
        }
    }

    /// Time remaining; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
