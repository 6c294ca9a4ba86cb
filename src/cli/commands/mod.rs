//! CLI command implementations.

pub mod config;
pub mod rank;
pub mod select;
