//! Provider registry and factory.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::{
    CredentialConfig, DispatchConfig, FallbackTarget, ProviderConfig, ProviderKind,
};
use crate::domain::ports::ReasoningProvider;
use crate::infrastructure::providers::ChatCompletionsProvider;

use super::mock::MockProvider;

/// Providers keyed by the name fallback targets use.
pub type ProviderMap = HashMap<String, Arc<dyn ReasoningProvider>>;

const OFFLINE_PROVIDER: &str = "offline";
const OFFLINE_MODEL: &str = "synthetic";

/// Builds the configured providers.
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create one provider per configured entry.
    pub fn build(config: &DispatchConfig) -> Result<ProviderMap> {
        let timeout = Duration::from_secs(config.call_timeout_secs);
        let mut providers: ProviderMap = HashMap::with_capacity(config.providers.len());
        for provider in &config.providers {
            let built: Arc<dyn ReasoningProvider> = match provider.kind {
                ProviderKind::ChatCompletions => {
                    Arc::new(ChatCompletionsProvider::new(provider, timeout)?)
                }
                ProviderKind::Mock => Arc::new(MockProvider::new(provider.name.clone())),
            };
            providers.insert(provider.name.clone(), built);
        }
        Ok(providers)
    }

    /// Dispatch settings that route every call to the in-process synthetic
    /// panel. Concurrency, timeout and retry settings are kept.
    pub fn offline_config(config: &DispatchConfig) -> DispatchConfig {
        DispatchConfig {
            providers: vec![ProviderConfig {
                name: OFFLINE_PROVIDER.to_string(),
                kind: ProviderKind::Mock,
                base_url: String::new(),
                requests_per_second: 1_000,
            }],
            credentials: vec![CredentialConfig {
                id: OFFLINE_PROVIDER.to_string(),
                provider: OFFLINE_PROVIDER.to_string(),
                api_key_env: None,
                api_key: Some(OFFLINE_PROVIDER.to_string()),
            }],
            fallback_chain: vec![FallbackTarget::new(
                OFFLINE_PROVIDER,
                OFFLINE_MODEL,
                OFFLINE_PROVIDER,
            )],
            ..config.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::ConfigLoader;

    #[test]
    fn test_build_default_providers() {
        let providers = ProviderRegistry::build(&DispatchConfig::default()).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers["groq"].name(), "groq");
    }

    #[test]
    fn test_offline_config_is_valid() {
        let mut config = crate::domain::models::Config::default();
        config.dispatch = ProviderRegistry::offline_config(&config.dispatch);
        ConfigLoader::validate(&config).unwrap();
        let providers = ProviderRegistry::build(&config.dispatch).unwrap();
        assert_eq!(providers[OFFLINE_PROVIDER].name(), OFFLINE_PROVIDER);
    }
}
