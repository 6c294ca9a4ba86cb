//! Infrastructure layer
//!
//! Configuration loading, logging, credential resolution, the HTTP
//! reasoning provider and snapshot loading.

pub mod config;
pub mod credentials;
pub mod logging;
pub mod providers;
pub mod stat_source;
