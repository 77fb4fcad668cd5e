//! Axum-based HTTP surface for the triage pipeline.

use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use metrics_exporter_prometheus::PrometheusHandle;

use triage_core::types::{MediaAsset, TriageRequest, TriageResult};
use triage_core::{Error, Result, ValidationReason};
use triage_model_gateway::BackendRegistry;

use crate::orchestrator::TriageOrchestrator;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Enable CORS.
    pub enable_cors: bool,
    /// Enable request tracing.
    pub enable_tracing: bool,
    /// HTTP body cap. Sits above the triage upload cap so oversize uploads
    /// reach validation and earn a structured 400 instead of a 413.
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            enable_tracing: true,
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// End-to-end pipeline.
    pub orchestrator: Arc<TriageOrchestrator>,
    /// Backend slots, for health reporting.
    pub registry: Arc<BackendRegistry>,
}

/// Gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(
        config: GatewayConfig,
        orchestrator: Arc<TriageOrchestrator>,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                orchestrator,
                registry,
            }),
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/triage", post(triage_handler))
            .route("/health", get(health_handler))
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes));

        if let Some(handle) = &self.metrics_handle {
            let handle = handle.clone();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run the server.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::http(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(addr = %addr, "Triage gateway starting");

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::http(format!("server error: {e}")))?;

        Ok(())
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`; the process answering is the health signal.
    pub status: &'static str,
    pub text_configured: bool,
    pub vision_configured: bool,
    pub audio_configured: bool,
    pub transcription_configured: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

/// Pipeline error with an HTTP shape.
///
/// Validation rejections echo their machine-readable reason verbatim;
/// upstream model failures are reported as an opaque 502 so provider
/// details never reach the caller.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, reason) = match &self.0 {
            Error::Validation(reason) => (
                StatusCode::BAD_REQUEST,
                reason.as_str().to_string(),
                Some(reason.as_str()),
            ),
            Error::InvalidRequest(message) => {
                (StatusCode::BAD_REQUEST, message.clone(), None)
            }
            Error::Overloaded => (
                StatusCode::SERVICE_UNAVAILABLE,
                "too many concurrent triage requests".to_string(),
                None,
            ),
            Error::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "triage request timed out".to_string(),
                None,
            ),
            Error::UnsupportedAudio(_)
            | Error::PreprocessingTimeout { .. }
            | Error::PrimaryModel(_)
            | Error::Transcription(_)
            | Error::MalformedResponse(_) => (
                StatusCode::BAD_GATEWAY,
                "model backends could not produce a triage assessment".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
                None,
            ),
        };

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                class = self.0.label(),
                error = %self.0,
                "Triage request failed"
            );
        } else {
            tracing::info!(
                status = status.as_u16(),
                class = self.0.label(),
                "Triage request rejected"
            );
        }

        let body = ErrorBody {
            error: ErrorDetail {
                message,
                kind: self.0.label(),
                reason,
            },
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let slots = state.registry.health();
    Json(HealthResponse {
        status: "ok",
        text_configured: slots.text_configured,
        vision_configured: slots.vision_configured,
        audio_configured: slots.audio_configured,
        transcription_configured: slots.transcription_configured,
    })
}

/// Triage handler: multipart in, canonical result out.
async fn triage_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> std::result::Result<Json<TriageResult>, ApiError> {
    let request = parse_multipart(multipart).await?;
    let result = state.orchestrator.handle(request).await?;
    Ok(Json(result))
}

/// Assembles a [`TriageRequest`] from the multipart form.
///
/// Unknown fields are drained and ignored. An empty `file` part counts as
/// no upload at all.
async fn parse_multipart(mut multipart: Multipart) -> Result<TriageRequest> {
    let mut request = TriageRequest::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid_request(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "file" => {
                let mime = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    Error::invalid_request(format!("unreadable file field: {e}"))
                })?;
                if bytes.is_empty() {
                    continue;
                }
                let mut asset = MediaAsset::new(mime, bytes);
                if let Some(file_name) = file_name {
                    asset = asset.with_file_name(file_name);
                }
                request.asset = Some(asset);
            }
            "text_input" => request.text = text_value(field).await?,
            "patient_age" => {
                if let Some(raw) = text_value(field).await? {
                    let age = raw
                        .parse::<u32>()
                        .map_err(|_| Error::validation(ValidationReason::InvalidPatientAge))?;
                    request.patient.age = Some(age);
                }
            }
            "patient_gender" => request.patient.gender = text_value(field).await?,
            "vital_signs" => request.patient.vital_signs = text_value(field).await?,
            "medical_history" => request.patient.medical_history = text_value(field).await?,
            "current_medications" => {
                request.patient.current_medications = text_value(field).await?
            }
            "allergies" => request.patient.allergies = text_value(field).await?,
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
                let _ = field.bytes().await;
            }
        }
    }

    Ok(request)
}

/// Text form value, trimmed; `None` when blank.
async fn text_value(field: Field<'_>) -> Result<Option<String>> {
    let raw = field
        .text()
        .await
        .map_err(|e| Error::invalid_request(format!("unreadable text field: {e}")))?;
    let trimmed = raw.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}
