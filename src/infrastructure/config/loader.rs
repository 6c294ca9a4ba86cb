use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project config file, looked up in the working directory.
pub const CONFIG_FILE: &str = "pundit.yaml";
/// Local overrides, not meant to be committed.
pub const LOCAL_CONFIG_FILE: &str = "pundit.local.yaml";
/// Prefix for environment overrides; nested keys use `__`.
pub const ENV_PREFIX: &str = "PUNDIT_";

const MAX_CONCURRENCY: usize = 64;
const REQUIRED_PERSONAS: usize = 3;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("At least one ranking criterion is required")]
    NoCriteria,

    #[error("Invalid weight {weight} for criterion {name}. Must be finite and non-negative")]
    InvalidCriterionWeight { name: String, weight: f64 },

    #[error("Criteria weights must not all be zero")]
    ZeroCriteriaWeights,

    #[error("Invalid shortlist_size: 0. Must be at least 1")]
    ZeroShortlist,

    #[error("Expected 3 personas, found {0}")]
    PersonaCount(usize),

    #[error("Duplicate persona id: {0}")]
    DuplicatePersona(String),

    #[error("Invalid chunk_size: 0. Must be at least 1")]
    ZeroChunkSize,

    #[error("Invalid probability_tolerance: {0}. Must be in (0, 0.5]")]
    InvalidTolerance(f64),

    #[error("Invalid max_concurrency: {0}. Must be between 1 and 64")]
    InvalidConcurrency(usize),

    #[error("Invalid call_timeout_secs: 0. Must be at least 1")]
    ZeroTimeout,

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Fallback chain is empty")]
    EmptyFallbackChain,

    #[error("Fallback target references unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Fallback target references unknown credential: {0}")]
    UnknownCredential(String),

    #[error("Credential {credential} belongs to {actual}, not {expected}")]
    CredentialProviderMismatch {
        credential: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid requests_per_second for provider {0}. Must be at least 1")]
    ZeroRate(String),

    #[error("Formation must total 15 players, found {0}")]
    InvalidFormation(usize),

    #[error("Invalid budget: {0}. Must be positive")]
    InvalidBudget(f64),

    #[error("Invalid max_per_club: 0. Must be at least 1")]
    ZeroClubCap,

    #[error("Invalid persona weight {weight} for {persona}. Must be finite and non-negative")]
    InvalidPersonaWeight { persona: String, weight: f64 },
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the working directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. pundit.yaml
    /// 3. pundit.local.yaml (optional)
    /// 4. Environment variables (PUNDIT_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`ConfigLoader::load`] with the config files looked up in `dir`.
    pub fn load_from(dir: &Path) -> Result<Config> {
        let config: Config = Self::figment(dir)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring env overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(dir: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join(CONFIG_FILE)))
            .merge(Yaml::file(dir.join(LOCAL_CONFIG_FILE)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::validate_logging(config)?;
        Self::validate_ranking(config)?;
        Self::validate_panel(config)?;
        Self::validate_dispatch(config)?;
        Self::validate_squad(config)?;

        for (persona, weight) in &config.consensus.persona_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidPersonaWeight {
                    persona: persona.clone(),
                    weight: *weight,
                });
            }
        }

        Ok(())
    }

    fn validate_logging(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }
        Ok(())
    }

    fn validate_ranking(config: &Config) -> Result<(), ConfigError> {
        let ranking = &config.ranking;
        if ranking.criteria.is_empty() {
            return Err(ConfigError::NoCriteria);
        }
        for criterion in &ranking.criteria {
            if !criterion.weight.is_finite() || criterion.weight < 0.0 {
                return Err(ConfigError::InvalidCriterionWeight {
                    name: criterion.name.clone(),
                    weight: criterion.weight,
                });
            }
        }
        if ranking.criteria.iter().all(|c| c.weight == 0.0) {
            return Err(ConfigError::ZeroCriteriaWeights);
        }
        if ranking.shortlist_size == 0 {
            return Err(ConfigError::ZeroShortlist);
        }
        Ok(())
    }

    fn validate_panel(config: &Config) -> Result<(), ConfigError> {
        let panel = &config.panel;
        if panel.personas.len() != REQUIRED_PERSONAS {
            return Err(ConfigError::PersonaCount(panel.personas.len()));
        }
        let mut seen = HashSet::new();
        for persona in &panel.personas {
            if !seen.insert(persona.id.as_str()) {
                return Err(ConfigError::DuplicatePersona(persona.id.clone()));
            }
        }
        if panel.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        let tolerance = panel.probability_tolerance;
        if !(tolerance > 0.0 && tolerance <= 0.5) {
            return Err(ConfigError::InvalidTolerance(tolerance));
        }
        Ok(())
    }

    fn validate_dispatch(config: &Config) -> Result<(), ConfigError> {
        let dispatch = &config.dispatch;
        if dispatch.max_concurrency == 0 || dispatch.max_concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::InvalidConcurrency(dispatch.max_concurrency));
        }
        if dispatch.call_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if dispatch.retry.initial_backoff_ms > dispatch.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                dispatch.retry.initial_backoff_ms,
                dispatch.retry.max_backoff_ms,
            ));
        }
        for provider in &dispatch.providers {
            if provider.requests_per_second == 0 {
                return Err(ConfigError::ZeroRate(provider.name.clone()));
            }
        }
        if dispatch.fallback_chain.is_empty() {
            return Err(ConfigError::EmptyFallbackChain);
        }
        for target in &dispatch.fallback_chain {
            if !dispatch.providers.iter().any(|p| p.name == target.provider) {
                return Err(ConfigError::UnknownProvider(target.provider.clone()));
            }
            let Some(credential) = dispatch
                .credentials
                .iter()
                .find(|c| c.id == target.credential)
            else {
                return Err(ConfigError::UnknownCredential(target.credential.clone()));
            };
            if credential.provider != target.provider {
                return Err(ConfigError::CredentialProviderMismatch {
                    credential: credential.id.clone(),
                    expected: target.provider.clone(),
                    actual: credential.provider.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_squad(config: &Config) -> Result<(), ConfigError> {
        let squad = &config.squad;
        if squad.formation.total() != crate::domain::models::SQUAD_SIZE {
            return Err(ConfigError::InvalidFormation(squad.formation.total()));
        }
        if !squad.budget.is_finite() || squad.budget <= 0.0 {
            return Err(ConfigError::InvalidBudget(squad.budget));
        }
        if squad.max_per_club == 0 {
            return Err(ConfigError::ZeroClubCap);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{Criterion, FallbackTarget, Polarity};
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ranking.shortlist_size, 30);
        assert_eq!(config.panel.chunk_size, 30);
        assert_eq!(config.panel.personas.len(), 3);
        assert_eq!(config.dispatch.max_concurrency, 4);
        assert!((config.squad.budget - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
ranking:
  shortlist_size: 40
  normalization: min_max
  criteria:
    - name: expected_points
      weight: 2.0
      polarity: higher_is_better
    - name: price
      weight: 1.0
      polarity: lower_is_better
dispatch:
  max_concurrency: 8
  retry:
    max_retries: 1
squad:
  budget: 95.5
  formation:
    goalkeepers: 2
    defenders: 5
    midfielders: 5
    forwards: 3
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.ranking.shortlist_size, 40);
        assert_eq!(config.ranking.criteria.len(), 2);
        assert_eq!(config.ranking.criteria[1].polarity, Polarity::LowerIsBetter);
        assert_eq!(config.dispatch.max_concurrency, 8);
        assert_eq!(config.dispatch.retry.max_retries, 1);
        assert_eq!(config.dispatch.retry.initial_backoff_ms, 500);
        assert!((config.squad.budget - 95.5).abs() < f64::EPSILON);
        assert_eq!(config.logging.format, "json");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_rejects_bad_criteria() {
        let mut config = Config::default();
        config.ranking.criteria = vec![Criterion::new("form", -1.0, Polarity::HigherIsBetter)];
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidCriterionWeight { .. })
        ));

        config.ranking.criteria = vec![Criterion::new("form", 0.0, Polarity::HigherIsBetter)];
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroCriteriaWeights)
        );
    }

    #[test]
    fn test_validate_persona_rules() {
        let mut config = Config::default();
        config.panel.personas.pop();
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::PersonaCount(2))
        );

        let mut config = Config::default();
        config.panel.personas[2].id = config.panel.personas[0].id.clone();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::DuplicatePersona(_))
        ));
    }

    #[test]
    fn test_validate_concurrency_bounds() {
        let mut config = Config::default();
        config.dispatch.max_concurrency = 0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConcurrency(0))
        );
        config.dispatch.max_concurrency = 65;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConcurrency(65))
        );
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.dispatch.retry.initial_backoff_ms = 10_000;
        config.dispatch.retry.max_backoff_ms = 1_000;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(10_000, 1_000))
        );
    }

    #[test]
    fn test_validate_fallback_references() {
        let mut config = Config::default();
        config
            .dispatch
            .fallback_chain
            .push(FallbackTarget::new("openrouter", "m", "groq-primary"));
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownProvider("openrouter".to_string()))
        );

        let mut config = Config::default();
        config
            .dispatch
            .fallback_chain
            .push(FallbackTarget::new("groq", "m", "nope"));
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownCredential("nope".to_string()))
        );

        let mut config = Config::default();
        config.dispatch.fallback_chain.clear();
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyFallbackChain)
        );
    }

    #[test]
    fn test_validate_squad_rules() {
        let mut config = Config::default();
        config.squad.formation.forwards = 4;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidFormation(16))
        );

        let mut config = Config::default();
        config.squad.budget = 0.0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBudget(0.0))
        );

        let mut config = Config::default();
        config.squad.max_per_club = 0;
        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::ZeroClubCap));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_hierarchical_merge_and_env_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "squad:\n  budget: 90.0\n  max_per_club: 2\nranking:\n  shortlist_size: 25\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(LOCAL_CONFIG_FILE),
            "squad:\n  budget: 85.0\n",
        )
        .unwrap();

        temp_env::with_vars(
            [
                ("PUNDIT_RANKING__SHORTLIST_SIZE", Some("20")),
                ("PUNDIT_DISPATCH__MAX_CONCURRENCY", Some("6")),
            ],
            || {
                let config = ConfigLoader::load_from(dir.path()).unwrap();
                assert!((config.squad.budget - 85.0).abs() < f64::EPSILON);
                assert_eq!(config.squad.max_per_club, 2);
                assert_eq!(config.ranking.shortlist_size, 20);
                assert_eq!(config.dispatch.max_concurrency, 6);
                assert_eq!(config.panel.personas.len(), 3);
            },
        );
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "panel:\n  chunk_size: 0\n").unwrap();
        let err = ConfigLoader::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }
}
