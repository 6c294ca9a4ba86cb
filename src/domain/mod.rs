//! Domain layer for the squad selection pipeline
//!
//! This module contains the core models, the port traits that infrastructure
//! adapters implement, and the error taxonomy shared by every stage.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{ConstraintError, InputError, ParseError, PipelineError, PipelineResult};
