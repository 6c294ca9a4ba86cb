//! Common test utilities for integration tests
//!
//! Shared fixtures for player snapshots, pipeline configuration and mock
//! provider wiring.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use pundit::adapters::providers::{MockProvider, ProviderMap};
use pundit::domain::models::{Config, DispatchConfig, FallbackTarget, PlayerRecord, Position};
use pundit::domain::ports::{Credential, ReasoningProvider};

/// Provider name used by every fixture route.
pub const MOCK: &str = "mock";

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A complete record with the default ranking criteria set.
pub fn player(id: u32, club: &str, position: Position, price: f64, form: f64) -> PlayerRecord {
    PlayerRecord::new(id, format!("Player {id}"), club, position, price)
        .with_stat("expected_points", form)
        .with_stat("value_season", form * 10.0 / price)
        .with_stat("pts_per_90", form * 0.8)
}

/// `counts` players per position (GK, DEF, MID, FWD), spread over twenty
/// clubs so the club cap never binds.
pub fn snapshot(counts: [u32; 4]) -> Vec<PlayerRecord> {
    let mut players = Vec::new();
    let mut id = 1;
    for (position, count) in Position::ALL.into_iter().zip(counts) {
        for _ in 0..count {
            let form = 2.0 + f64::from((id * 37) % 23) / 3.0;
            let price = 4.0 + f64::from(id % 5);
            players.push(player(id, &format!("C{:02}", id % 20), position, price, form));
            id += 1;
        }
    }
    players
}

/// Default configuration with one fallback model and the given credential
/// ids on the mock provider. Retries back off for a millisecond.
pub fn config(credentials: &[&str]) -> Config {
    let mut config = Config::default();
    config.dispatch = DispatchConfig {
        fallback_chain: credentials
            .iter()
            .map(|c| FallbackTarget::new(MOCK, "model-a", *c))
            .collect(),
        ..DispatchConfig::default()
    };
    config.dispatch.retry.initial_backoff_ms = 1;
    config.dispatch.retry.max_backoff_ms = 4;
    config
}

pub fn credentials(ids: &[&str]) -> Vec<Credential> {
    ids.iter()
        .map(|id| Credential::new(*id, MOCK, format!("secret-{id}")))
        .collect()
}

pub fn providers(provider: &Arc<MockProvider>) -> ProviderMap {
    let mut providers: HashMap<String, Arc<dyn ReasoningProvider>> = HashMap::new();
    providers.insert(MOCK.to_string(), Arc::clone(provider) as Arc<dyn ReasoningProvider>);
    providers
}
