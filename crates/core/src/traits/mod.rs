//! Core traits for the triage pipeline.
//!
//! The only seam between the routing layer and concrete model providers is
//! the `backend` module's [`InferenceBackend`] trait.

pub mod backend;

pub use backend::*;
