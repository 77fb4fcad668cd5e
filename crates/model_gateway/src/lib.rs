#![deny(unused)]
//! Model routing layer for the triage pipeline.
//!
//! This crate provides:
//! - The per-request routing state machine with single-shot audio/video
//!   fallback
//! - Mistral-compatible backend clients (text, vision, audio chat, and
//!   transcription)
//! - A lazy process-wide transcription handle
//! - Normalization of raw model output into canonical triage results

pub mod normalizer;
pub mod prompt;
pub mod providers;
pub mod router;
pub mod transcription;
pub mod wav;

pub use providers::{BackendRegistry, MistralBackend, SlotHealth};
pub use router::{ModelRouter, RouteReport, RoutedInput};
pub use transcription::TranscriptionFallback;
