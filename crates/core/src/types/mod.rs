//! Core type definitions for the triage pipeline.
//!
//! This module contains the fundamental data structures shared across the
//! ingestion and routing layers.
//!
//! Broken down into submodules for better maintainability.

pub mod attempt;
pub mod audio;
pub mod request;
pub mod result;

// Re-export everything so callers can use `triage_core::types::*`.
pub use attempt::*;
pub use audio::*;
pub use request::*;
pub use result::*;
