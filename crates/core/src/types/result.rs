use serde::{Deserialize, Serialize};

// =============================================================================
// Canonical Result Types
// =============================================================================

/// Severity bucket derived from the clamped 0-100 score.
///
/// Thresholds are fixed: the same score always lands in the same bucket no
/// matter which backend produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeverityLevel {
    Critical,
    High,
    Moderate,
    Low,
    Minimal,
}

impl SeverityLevel {
    /// Bucket a clamped score.
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::Critical,
            70..=89 => Self::High,
            50..=69 => Self::Moderate,
            30..=49 => Self::Low,
            _ => Self::Minimal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Moderate => "Moderate",
            Self::Low => "Low",
            Self::Minimal => "Minimal",
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency label shown to clinical staff, derived from the same
/// thresholds as [`SeverityLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    Immediate,
    Urgent,
    Moderate,
    Low,
    #[serde(rename = "Non-urgent")]
    NonUrgent,
}

impl Urgency {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::Immediate,
            70..=89 => Self::Urgent,
            50..=69 => Self::Moderate,
            30..=49 => Self::Low,
            _ => Self::NonUrgent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "Immediate",
            Self::Urgent => "Urgent",
            Self::Moderate => "Moderate",
            Self::Low => "Low",
            Self::NonUrgent => "Non-urgent",
        }
    }
}

/// Canonical triage result returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    /// Severity score clamped to 0-100.
    pub severity_score: u8,
    /// Bucket derived from the score.
    pub severity_level: SeverityLevel,
    /// Model-written clinical assessment.
    pub triage_assessment: String,
    /// Service the patient should be directed to.
    pub recommended_service: String,
    /// Urgency label derived from the score.
    pub urgency: Urgency,
    /// Model-written rationale; empty when the model gave none.
    pub reasoning: String,
    /// Identifier of the model whose answer was accepted.
    pub model_used: String,
}
