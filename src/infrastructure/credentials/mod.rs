//! Credentials management infrastructure
//!
//! Resolves configured credentials into [`Credential`] values once at
//! startup. Secrets come from environment variables or, for local use,
//! inline config values.

use std::env;

use tracing::{debug, warn};

use crate::domain::models::CredentialConfig;
use crate::domain::ports::Credential;

/// Resolve every credential whose secret is available.
///
/// Missing or empty secrets are skipped with a warning; the rotation
/// context drops fallback targets that point at them.
pub fn resolve_credentials(configs: &[CredentialConfig]) -> Vec<Credential> {
    configs
        .iter()
        .filter_map(|config| {
            let secret = resolve_secret(config);
            if secret.is_none() {
                warn!(
                    credential = %config.id,
                    env = config.api_key_env.as_deref().unwrap_or("-"),
                    "Credential has no secret, skipping"
                );
            }
            secret.map(|secret| {
                debug!(credential = %config.id, provider = %config.provider, "Credential resolved");
                Credential::new(config.id.clone(), config.provider.clone(), secret)
            })
        })
        .collect()
}

fn resolve_secret(config: &CredentialConfig) -> Option<String> {
    let inline = config
        .api_key
        .as_ref()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());
    inline.or_else(|| {
        config
            .api_key_env
            .as_ref()
            .and_then(|var| env::var(var).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_env(id: &str, var: &str) -> CredentialConfig {
        CredentialConfig {
            id: id.to_string(),
            provider: "groq".to_string(),
            api_key_env: Some(var.to_string()),
            api_key: None,
        }
    }

    #[test]
    fn test_resolves_env_and_skips_missing() {
        temp_env::with_vars(
            [
                ("PUNDIT_TEST_KEY_A", Some("gsk_aaaaaaaaaaaaaaaaaaaa")),
                ("PUNDIT_TEST_KEY_B", None),
                ("PUNDIT_TEST_KEY_C", Some("   ")),
            ],
            || {
                let resolved = resolve_credentials(&[
                    from_env("a", "PUNDIT_TEST_KEY_A"),
                    from_env("b", "PUNDIT_TEST_KEY_B"),
                    from_env("c", "PUNDIT_TEST_KEY_C"),
                ]);
                assert_eq!(resolved.len(), 1);
                assert_eq!(resolved[0].id, "a");
                assert_eq!(resolved[0].expose_secret(), "gsk_aaaaaaaaaaaaaaaaaaaa");
            },
        );
    }

    #[test]
    fn test_inline_key_wins() {
        let config = CredentialConfig {
            id: "inline".to_string(),
            provider: "groq".to_string(),
            api_key_env: Some("PUNDIT_TEST_UNSET_VAR".to_string()),
            api_key: Some("inline-secret".to_string()),
        };
        let resolved = resolve_credentials(&[config]);
        assert_eq!(resolved[0].expose_secret(), "inline-secret");
    }
}
