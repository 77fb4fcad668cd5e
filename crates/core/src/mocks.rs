//! Mock implementations of core traits for testing.
//!
//! Scripted backends used across the codebase for unit and integration
//! tests: each invocation consumes the next behavior in the script, and the
//! last behavior repeats once the script is exhausted.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::traits::InferenceBackend;
use crate::types::{Deadline, InferencePayload, RawResponse, RequestContext};
use crate::{Error, Result};

// =============================================================================
// Mock Backend
// =============================================================================

/// One scripted behavior for a mock backend invocation.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Answer with this content.
    Reply(String),
    /// Fail with a primary-model error.
    Fail(String),
    /// Sleep past the attempt deadline, then fail.
    Hang,
}

/// Scripted mock backend.
pub struct MockBackend {
    model: String,
    script: Mutex<Vec<MockBehavior>>,
    calls: Mutex<usize>,
    configured: bool,
}

impl MockBackend {
    /// Create a mock with a queue of behaviors.
    pub fn new(model: &str, script: Vec<MockBehavior>) -> Self {
        Self {
            model: model.to_string(),
            script: Mutex::new(script),
            calls: Mutex::new(0),
            configured: true,
        }
    }

    /// Mock that always replies with the same content.
    pub fn constant(model: &str, content: &str) -> Self {
        Self::new(model, vec![MockBehavior::Reply(content.to_string())])
    }

    /// Mock that always fails.
    pub fn failing(model: &str, message: &str) -> Self {
        Self::new(model, vec![MockBehavior::Fail(message.to_string())])
    }

    /// Mock that sleeps past every deadline.
    pub fn hanging(model: &str) -> Self {
        Self::new(model, vec![MockBehavior::Hang])
    }

    /// Mock that reports itself unconfigured.
    pub fn unconfigured(model: &str) -> Self {
        let mut mock = Self::new(model, Vec::new());
        mock.configured = false;
        mock
    }

    /// Number of invocations made against this mock.
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn configured(&self) -> bool {
        self.configured
    }

    async fn invoke(
        &self,
        _payload: InferencePayload,
        _ctx: &RequestContext,
        deadline: Deadline,
    ) -> Result<RawResponse> {
        let behavior = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            let script = self.script.lock().unwrap();
            let idx = (*calls - 1).min(script.len().saturating_sub(1));
            script.get(idx).cloned()
        };

        match behavior {
            Some(MockBehavior::Reply(content)) => Ok(RawResponse {
                model: self.model.clone(),
                content,
            }),
            Some(MockBehavior::Fail(message)) => Err(Error::primary_model(message)),
            Some(MockBehavior::Hang) => {
                tokio::time::sleep(deadline.remaining() + Duration::from_millis(50)).await;
                Err(Error::timeout("mock backend overran its deadline"))
            }
            None => Ok(RawResponse {
                model: self.model.clone(),
                content: "{}".to_string(),
            }),
        }
    }
}

/// A well-formed triage answer for scripting mocks, as the JSON text a
/// model would emit.
pub fn scripted_triage_json(score: i64, assessment: &str, service: &str) -> String {
    format!(
        "{{\"severity_score\": {}, \"triage_assessment\": \"{}\", \"recommended_service\": \"{}\", \"reasoning\": \"scripted\"}}",
        score, assessment, service
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PatientContext;

    fn ctx() -> RequestContext {
        RequestContext {
            trace_id: "test-trace".to_string(),
            patient: PatientContext::default(),
            deadline: Deadline::within(Duration::from_secs(5)),
        }
    }

    #[tokio::test]
    async fn scripts_play_in_order_and_last_entry_repeats() {
        let mock = MockBackend::new(
            "stub",
            vec![
                MockBehavior::Fail("first".into()),
                MockBehavior::Reply("second".into()),
            ],
        );
        let ctx = ctx();
        let deadline = Deadline::within(Duration::from_secs(1));

        let payload = InferencePayload::Text {
            system: String::new(),
            prompt: "p".into(),
        };
        assert!(mock.invoke(payload.clone(), &ctx, deadline).await.is_err());
        let second = mock.invoke(payload.clone(), &ctx, deadline).await.unwrap();
        assert_eq!(second.content, "second");
        let third = mock.invoke(payload, &ctx, deadline).await.unwrap();
        assert_eq!(third.content, "second");
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn scripted_json_is_parseable() {
        let json = scripted_triage_json(85, "acute chest pain", "cardiology");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["severity_score"], 85);
        assert_eq!(value["recommended_service"], "cardiology");
    }
}
