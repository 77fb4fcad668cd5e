#![deny(unused)]
//! HTTP gateway for the triage pipeline.
//!
//! This crate provides the entry point of the system: multipart intake,
//! pre-flight validation, audio normalization, and the bounded orchestrator
//! that drives routing under one end-to-end deadline.

pub mod audio;
pub mod orchestrator;
pub mod server;
pub mod validation;

pub use audio::AudioNormalizer;
pub use orchestrator::TriageOrchestrator;
pub use server::{GatewayConfig, GatewayServer};
pub use validation::ValidationGate;
