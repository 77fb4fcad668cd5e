use config::{Config, ConfigError, Environment, File};
use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub backends: BackendsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

/// Upload, timing, and concurrency bounds for the pipeline.
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Upload size cap in bytes.
    pub max_upload_bytes: usize,
    /// Media duration cap in seconds.
    pub max_media_seconds: u64,
    /// Budget for audio normalization.
    pub preprocessing_budget_ms: u64,
    /// Per-attempt timeout for the primary backend.
    pub primary_timeout_ms: u64,
    /// Per-attempt timeout for the transcription leg of the fallback.
    pub transcription_timeout_ms: u64,
    /// Per-attempt timeout for the text leg of the fallback.
    pub fallback_timeout_ms: u64,
    /// End-to-end deadline for one request.
    pub request_deadline_ms: u64,
    /// Maximum concurrent triage executions.
    pub max_concurrency: usize,
}

impl LimitsConfig {
    pub fn max_media_duration(&self) -> Duration {
        Duration::from_secs(self.max_media_seconds)
    }

    pub fn preprocessing_budget(&self) -> Duration {
        Duration::from_millis(self.preprocessing_budget_ms)
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_millis(self.transcription_timeout_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

/// Model API connection settings. One key serves all four slots.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendsConfig {
    /// Base URL of the chat/transcription API.
    pub base_url: String,
    /// API key; backends report themselves unconfigured without one.
    pub api_key: Option<Secret<String>>,
    pub text_model: String,
    pub vision_model: String,
    pub audio_model: String,
    pub transcription_model: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("TRIAGE_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map TRIAGE__LIMITS__MAX_CONCURRENCY=16 to limits.max_concurrency
            .add_source(Environment::with_prefix("TRIAGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            enable_cors: true,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 25 * 1024 * 1024,
            max_media_seconds: 300,
            preprocessing_budget_ms: 5_000,
            primary_timeout_ms: 30_000,
            transcription_timeout_ms: 60_000,
            fallback_timeout_ms: 30_000,
            request_deadline_ms: 90_000,
            max_concurrency: 8,
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mistral.ai".into(),
            api_key: None,
            text_model: "mistral-large-latest".into(),
            vision_model: "pixtral-large-latest".into(),
            audio_model: "voxtral-small-latest".into(),
            transcription_model: "voxtral-mini-latest".into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            backends: BackendsConfig::default(),
        }
    }
}
