//! Response normalization.
//!
//! Backends answer with JSON, but rarely with *only* JSON: prose wrappers,
//! markdown fences, stringified numbers, and renamed fields all show up in
//! practice. Normalization extracts the first JSON object from the raw
//! content, reads the triage fields tolerantly, clamps the score to 0-100
//! and derives the severity level and urgency from the clamped score. The
//! derived values always win over whatever the model claimed.

use serde_json::Value;
use triage_core::types::{SeverityLevel, TriageResult, Urgency};
use triage_core::{Error, Result};

/// Accepted aliases for the severity score field.
const SCORE_KEYS: &[&str] = &["severity_score", "severityScore", "score", "severity"];
/// Accepted aliases for the assessment field.
const ASSESSMENT_KEYS: &[&str] = &["triage_assessment", "assessment", "diagnosis"];
/// Accepted aliases for the recommended service field.
const SERVICE_KEYS: &[&str] = &["recommended_service", "service", "recommendation"];
/// Accepted aliases for the reasoning field.
const REASONING_KEYS: &[&str] = &["reasoning", "rationale", "explanation"];

/// Normalizes a raw backend reply into a [`TriageResult`].
///
/// Fails with [`Error::MalformedResponse`] when no JSON object can be found
/// or when the score, assessment, or service cannot be extracted from it.
pub fn normalize(model: &str, content: &str) -> Result<TriageResult> {
    let body = extract_json(content).ok_or_else(|| {
        Error::malformed_response(format!("no JSON object in reply from {model}"))
    })?;
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::malformed_response(format!("unparseable JSON from {model}: {e}")))?;

    let raw_score = pick_score(&value)
        .ok_or_else(|| Error::malformed_response(format!("missing severity score from {model}")))?;
    let assessment = pick_string(&value, ASSESSMENT_KEYS)
        .ok_or_else(|| Error::malformed_response(format!("missing assessment from {model}")))?;
    let service = pick_string(&value, SERVICE_KEYS).ok_or_else(|| {
        Error::malformed_response(format!("missing recommended service from {model}"))
    })?;
    let reasoning = pick_string(&value, REASONING_KEYS).unwrap_or_default();

    let severity_score = clamp_score(raw_score);
    Ok(TriageResult {
        severity_score,
        severity_level: SeverityLevel::from_score(severity_score),
        triage_assessment: assessment,
        recommended_service: service,
        urgency: Urgency::from_score(severity_score),
        reasoning,
        model_used: model.to_string(),
    })
}

/// Slices the outermost `{...}` span out of possibly prose-wrapped content.
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Reads the severity score as a number or a numeric string.
fn pick_score(value: &Value) -> Option<f64> {
    for key in SCORE_KEYS {
        match value.get(key) {
            Some(Value::Number(n)) => return n.as_f64().filter(|v| v.is_finite()),
            Some(Value::String(s)) => {
                if let Ok(parsed) = s.trim().parse::<f64>() {
                    if parsed.is_finite() {
                        return Some(parsed);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Reads the first non-empty string under any of the given keys.
fn pick_string(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = value.get(key) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Clamps a raw score into the 0-100 contract before rounding.
fn clamp_score(raw: f64) -> u8 {
    raw.clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_json_reply() {
        let content = r#"{"severity_score": 85, "triage_assessment": "Suspected ACS",
            "recommended_service": "Emergency Department", "reasoning": "chest pain"}"#;
        let result = normalize("mistral-large-latest", content).unwrap();
        assert_eq!(result.severity_score, 85);
        assert_eq!(result.severity_level, SeverityLevel::High);
        assert_eq!(result.urgency, Urgency::Urgent);
        assert_eq!(result.model_used, "mistral-large-latest");
    }

    #[test]
    fn strips_prose_and_markdown_fences() {
        let content = "Here is my assessment:\n```json\n{\"score\": 42, \
            \"assessment\": \"Sprained ankle\", \"service\": \"General practice\"}\n```\nStay safe.";
        let result = normalize("m", content).unwrap();
        assert_eq!(result.severity_score, 42);
        assert_eq!(result.severity_level, SeverityLevel::Low);
        assert_eq!(result.recommended_service, "General practice");
    }

    #[test]
    fn accepts_stringified_scores() {
        let content = r#"{"severity_score": "73", "triage_assessment": "a",
            "recommended_service": "b"}"#;
        assert_eq!(normalize("m", content).unwrap().severity_score, 73);
    }

    #[test]
    fn accepts_camel_case_score() {
        let content = r#"{"severityScore": 61, "assessment": "a", "service": "b"}"#;
        assert_eq!(normalize("m", content).unwrap().severity_score, 61);
    }

    #[test]
    fn clamps_out_of_range_scores() {
        let high = r#"{"severity_score": 250, "triage_assessment": "a", "recommended_service": "b"}"#;
        assert_eq!(normalize("m", high).unwrap().severity_score, 100);

        let low = r#"{"severity_score": -12, "triage_assessment": "a", "recommended_service": "b"}"#;
        let result = normalize("m", low).unwrap();
        assert_eq!(result.severity_score, 0);
        assert_eq!(result.severity_level, SeverityLevel::Minimal);
    }

    #[test]
    fn derived_level_overrides_the_claimed_one() {
        let content = r#"{"severity_score": 95, "severity_level": "Minimal",
            "triage_assessment": "a", "recommended_service": "b"}"#;
        let result = normalize("m", content).unwrap();
        assert_eq!(result.severity_level, SeverityLevel::Critical);
        assert_eq!(result.urgency, Urgency::Immediate);
    }

    #[test]
    fn missing_fields_are_malformed() {
        let no_score = r#"{"triage_assessment": "a", "recommended_service": "b"}"#;
        assert!(matches!(
            normalize("m", no_score),
            Err(Error::MalformedResponse(_))
        ));

        let no_assessment = r#"{"severity_score": 10, "recommended_service": "b"}"#;
        assert!(matches!(
            normalize("m", no_assessment),
            Err(Error::MalformedResponse(_))
        ));

        let no_service = r#"{"severity_score": 10, "triage_assessment": "a"}"#;
        assert!(matches!(
            normalize("m", no_service),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_json_content_is_malformed() {
        assert!(matches!(
            normalize("m", "I cannot help with that."),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(normalize("m", ""), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn missing_reasoning_defaults_to_empty() {
        let content = r#"{"severity_score": 55, "triage_assessment": "a", "recommended_service": "b"}"#;
        assert_eq!(normalize("m", content).unwrap().reasoning, "");
    }
}
