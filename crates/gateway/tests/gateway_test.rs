//! HTTP surface tests: multipart intake, validation mapping, and the
//! health report, exercised through the real router stack with scripted
//! backends.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use triage_core::config::LimitsConfig;
use triage_core::mocks::{scripted_triage_json, MockBackend};
use triage_core::InferenceBackend;
use triage_gateway::{GatewayConfig, GatewayServer, TriageOrchestrator};
use triage_model_gateway::{BackendRegistry, ModelRouter, TranscriptionFallback};

struct Slots {
    text: Arc<MockBackend>,
    vision: Arc<MockBackend>,
    audio_chat: Arc<MockBackend>,
    stt: Arc<MockBackend>,
}

fn test_router(limits: LimitsConfig, text: MockBackend) -> (Router, Slots) {
    let slots = Slots {
        text: Arc::new(text),
        vision: Arc::new(MockBackend::constant(
            "pixtral-large-latest",
            &scripted_triage_json(40, "stub", "stub"),
        )),
        audio_chat: Arc::new(MockBackend::constant("voxtral-small-latest", "{}")),
        stt: Arc::new(MockBackend::constant("voxtral-mini-latest", "transcript")),
    };
    let registry = Arc::new(BackendRegistry::with_slots(
        Arc::clone(&slots.text) as Arc<dyn InferenceBackend>,
        Arc::clone(&slots.vision) as Arc<dyn InferenceBackend>,
        Arc::clone(&slots.audio_chat) as Arc<dyn InferenceBackend>,
        TranscriptionFallback::preloaded(Arc::clone(&slots.stt) as Arc<dyn InferenceBackend>),
    ));
    let router = ModelRouter::new(Arc::clone(&registry), limits.clone());
    let orchestrator = Arc::new(TriageOrchestrator::new(&limits, router));
    let server = GatewayServer::new(GatewayConfig::default(), orchestrator, registry);
    (server.build_router(), slots)
}

// ===== Multipart helpers =====

const BOUNDARY: &str = "triage-test-boundary";

struct FormBuilder {
    body: Vec<u8>,
}

impl FormBuilder {
    fn new() -> Self {
        Self { body: Vec::new() }
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, file_name: &str, mime: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn build(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

async fn post_triage(router: Router, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/triage")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ===== Tests =====

#[tokio::test]
async fn health_reports_per_slot_configuration() {
    let (router, _slots) = test_router(
        LimitsConfig::default(),
        MockBackend::unconfigured("mistral-large-latest"),
    );

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["text_configured"], false);
    assert_eq!(value["vision_configured"], true);
    assert_eq!(value["audio_configured"], true);
    assert_eq!(value["transcription_configured"], true);
}

#[tokio::test]
async fn text_triage_round_trips_the_full_contract() {
    let (router, slots) = test_router(
        LimitsConfig::default(),
        MockBackend::constant(
            "mistral-large-latest",
            &scripted_triage_json(85, "Suspected acute coronary syndrome", "Emergency Department"),
        ),
    );

    let body = FormBuilder::new()
        .text("text_input", "chest pain, shortness of breath")
        .text("patient_age", "58")
        .text("patient_gender", "male")
        .text("vital_signs", "BP 150/95, HR 110")
        .build();
    let (status, value) = post_triage(router, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["severity_score"], 85);
    assert_eq!(value["severity_level"], "High");
    assert_eq!(value["urgency"], "Urgent");
    assert_eq!(
        value["triage_assessment"],
        "Suspected acute coronary syndrome"
    );
    assert_eq!(value["recommended_service"], "Emergency Department");
    assert_eq!(value["model_used"], "mistral-large-latest");
    assert!(value["reasoning"].is_string());
    assert_eq!(slots.text.call_count(), 1);
    assert_eq!(slots.audio_chat.call_count(), 0);
}

#[tokio::test]
async fn non_numeric_patient_age_is_rejected() {
    let (router, slots) = test_router(
        LimitsConfig::default(),
        MockBackend::constant("mistral-large-latest", "{}"),
    );

    let body = FormBuilder::new()
        .text("text_input", "headache")
        .text("patient_age", "fifty-eight")
        .build();
    let (status, value) = post_triage(router, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["reason"], "invalid_patient_age");
    assert_eq!(value["error"]["type"], "validation");
    assert_eq!(slots.text.call_count(), 0);
}

#[tokio::test]
async fn unknown_multipart_fields_are_ignored() {
    let (router, _slots) = test_router(
        LimitsConfig::default(),
        MockBackend::constant(
            "mistral-large-latest",
            &scripted_triage_json(20, "Minor complaint", "Self-care"),
        ),
    );

    let body = FormBuilder::new()
        .text("text_input", "stubbed toe")
        .text("favourite_color", "teal")
        .build();
    let (status, value) = post_triage(router, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["severity_level"], "Minimal");
}

#[tokio::test]
async fn empty_form_is_rejected_as_no_input() {
    let (router, slots) = test_router(
        LimitsConfig::default(),
        MockBackend::constant("mistral-large-latest", "{}"),
    );

    let (status, value) = post_triage(router, FormBuilder::new().build()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["message"], "no_input");
    assert_eq!(value["error"]["reason"], "no_input");
    assert_eq!(slots.text.call_count(), 0);
    assert_eq!(slots.audio_chat.call_count(), 0);
}

#[tokio::test]
async fn whitespace_only_text_counts_as_no_input() {
    let (router, _slots) = test_router(
        LimitsConfig::default(),
        MockBackend::constant("mistral-large-latest", "{}"),
    );

    let body = FormBuilder::new().text("text_input", "   \n\t ").build();
    let (status, value) = post_triage(router, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["reason"], "no_input");
}

#[tokio::test]
async fn oversize_upload_is_rejected_before_any_decoding() {
    let limits = LimitsConfig {
        max_upload_bytes: 1024,
        ..LimitsConfig::default()
    };
    let (router, slots) = test_router(
        limits,
        MockBackend::constant("mistral-large-latest", "{}"),
    );

    let body = FormBuilder::new()
        .file("visit.wav", "audio/wav", &vec![0u8; 4096])
        .build();
    let (status, value) = post_triage(router, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["message"], "file_too_large");
    assert_eq!(value["error"]["reason"], "file_too_large");
    assert_eq!(slots.audio_chat.call_count(), 0);
    assert_eq!(slots.stt.call_count(), 0);
    assert_eq!(slots.text.call_count(), 0);
}

#[tokio::test]
async fn disallowed_container_is_unsupported_media_type() {
    let (router, _slots) = test_router(
        LimitsConfig::default(),
        MockBackend::constant("mistral-large-latest", "{}"),
    );

    let body = FormBuilder::new()
        .file("visit.flac", "audio/flac", b"fLaC....")
        .build();
    let (status, value) = post_triage(router, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["reason"], "unsupported_media_type");
}

#[tokio::test]
async fn empty_file_part_falls_back_to_text() {
    let (router, _slots) = test_router(
        LimitsConfig::default(),
        MockBackend::constant(
            "mistral-large-latest",
            &scripted_triage_json(35, "Sprain", "Urgent Care"),
        ),
    );

    let body = FormBuilder::new()
        .file("empty.wav", "audio/wav", b"")
        .text("text_input", "twisted ankle")
        .build();
    let (status, value) = post_triage(router, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["severity_level"], "Low");
    assert_eq!(value["model_used"], "mistral-large-latest");
}
