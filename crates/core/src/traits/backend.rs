//! Model backend trait shared by production providers and test doubles.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Deadline, InferencePayload, RawResponse, RequestContext};

/// A model backend capable of answering one payload shape.
///
/// Implementations are shared behind `Arc` and must be safe to invoke
/// concurrently. An invocation must respect the deadline it was given;
/// callers additionally enforce it from the outside, so an implementation
/// that overruns is cancelled rather than trusted.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Identifier of the model behind this backend.
    fn model_id(&self) -> &str;

    /// Whether the backend has what it needs to serve traffic.
    fn configured(&self) -> bool {
        true
    }

    /// Invoke the backend with a payload under a deadline.
    async fn invoke(
        &self,
        payload: InferencePayload,
        ctx: &RequestContext,
        deadline: Deadline,
    ) -> Result<RawResponse>;
}
