//! Adapters wiring ports to concrete providers

pub mod providers;
