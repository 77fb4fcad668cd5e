#![deny(unused)]
//! Core types, traits, and error definitions for the triage pipeline.
//!
//! This crate provides the foundational building blocks shared across the
//! ingestion and model-routing layers.

pub mod config;
pub mod error;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, Result, ValidationReason};
pub use traits::*;
pub use types::*;
