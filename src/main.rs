#![deny(unused)]
//! Meditriage - multimodal patient-triage gateway.
//!
//! Wires configuration, the model backend registry, the router, and the
//! HTTP surface together, then serves until shutdown.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use triage_core::config::AppConfig;
use triage_gateway::{GatewayConfig, GatewayServer, TriageOrchestrator};
use triage_model_gateway::{BackendRegistry, ModelRouter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configure_tracing();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load configuration; using defaults");
            AppConfig::default()
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        max_concurrency = config.limits.max_concurrency,
        "Starting triage gateway"
    );

    // =========================================================================
    // Model backends and routing
    // =========================================================================
    let registry = Arc::new(BackendRegistry::from_config(&config.backends)?);
    let slots = registry.health();
    tracing::info!(
        text_configured = slots.text_configured,
        vision_configured = slots.vision_configured,
        audio_configured = slots.audio_configured,
        transcription_configured = slots.transcription_configured,
        "Backend registry initialized"
    );
    if !slots.text_configured {
        tracing::warn!("No API key configured; every triage request will fail");
    }

    let router = ModelRouter::new(Arc::clone(&registry), config.limits.clone());
    let orchestrator = Arc::new(TriageOrchestrator::new(&config.limits, router));

    // =========================================================================
    // Metrics and HTTP surface
    // =========================================================================
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;

    let gateway_config = GatewayConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        enable_cors: config.server.enable_cors,
        ..GatewayConfig::default()
    };

    println!();
    println!("Meditriage v{}", env!("CARGO_PKG_VERSION"));
    println!("  POST /triage   - multipart triage intake");
    println!("  GET  /health   - backend slot report");
    println!("  GET  /metrics  - Prometheus exposition");
    println!(
        "  listening on http://{}:{}",
        config.server.host, config.server.port
    );
    println!();

    GatewayServer::new(gateway_config, orchestrator, registry)
        .with_metrics(metrics_handle)
        .run()
        .await?;

    Ok(())
}

/// Stdout logging with an env-driven filter.
fn configure_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(
        |_| "info,triage_core=debug,triage_gateway=debug,triage_model_gateway=debug".into(),
    ));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
