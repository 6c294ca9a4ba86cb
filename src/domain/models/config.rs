use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::evaluation::BucketWeights;
use super::squad::{Formation, SquadConstraints};

/// Main configuration structure for the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ranking pre-filter configuration
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Expert panel configuration
    #[serde(default)]
    pub panel: PanelConfig,

    /// Outbound provider dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Consensus merge configuration
    #[serde(default)]
    pub consensus: ConsensusConfig,

    /// Squad constraints and search limits
    #[serde(default)]
    pub squad: SquadConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Direction in which a criterion improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    HigherIsBetter,
    LowerIsBetter,
}

/// Column normalisation applied before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Divide by the column's Euclidean norm.
    #[default]
    Vector,
    /// Rescale to `[0, 1]` by the column's range.
    MinMax,
}

/// One ranking criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Stat key on the player record (`price` reads the record price)
    pub name: String,
    pub weight: f64,
    pub polarity: Polarity,
}

impl Criterion {
    pub fn new(name: impl Into<String>, weight: f64, polarity: Polarity) -> Self {
        Self {
            name: name.into(),
            weight,
            polarity,
        }
    }
}

/// Ranking pre-filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RankingConfig {
    /// Shortlist size K
    #[serde(default = "default_shortlist_size")]
    pub shortlist_size: usize,

    #[serde(default)]
    pub normalization: Normalization,

    /// Reserve shortlist places per position in proportion to the formation
    #[serde(default = "default_true")]
    pub position_aware: bool,

    #[serde(default = "default_criteria")]
    pub criteria: Vec<Criterion>,
}

const fn default_shortlist_size() -> usize {
    30
}

const fn default_true() -> bool {
    true
}

fn default_criteria() -> Vec<Criterion> {
    vec![
        Criterion::new("expected_points", 0.4, Polarity::HigherIsBetter),
        Criterion::new("value_season", 0.3, Polarity::HigherIsBetter),
        Criterion::new("pts_per_90", 0.2, Polarity::HigherIsBetter),
        Criterion::new("price", 0.1, Polarity::LowerIsBetter),
    ]
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            shortlist_size: default_shortlist_size(),
            normalization: Normalization::default(),
            position_aware: true,
            criteria: default_criteria(),
        }
    }
}

/// A persona: a fixed evaluation stance applied by the shared expert engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Stable identifier (`value_hunter`)
    pub id: String,
    /// Display name (`Value Hunter`)
    pub name: String,
    /// System prompt describing the stance
    pub prompt_template: String,
    /// Signals the persona should weigh
    pub rubric: String,
}

/// Expert panel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PanelConfig {
    /// Candidates per evaluation request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Completion budget per candidate in a chunk
    #[serde(default = "default_max_tokens_per_candidate")]
    pub max_tokens_per_candidate: u32,

    #[serde(default)]
    pub temperature: f32,

    /// Allowed deviation of a bucket sum from 1.0
    #[serde(default = "default_probability_tolerance")]
    pub probability_tolerance: f64,

    #[serde(default = "default_justification_max_chars")]
    pub justification_max_chars: usize,

    #[serde(default = "default_personas")]
    pub personas: Vec<PersonaConfig>,
}

const fn default_chunk_size() -> usize {
    30
}

const fn default_max_tokens_per_candidate() -> u32 {
    70
}

const fn default_probability_tolerance() -> f64 {
    0.05
}

const fn default_justification_max_chars() -> usize {
    200
}

fn default_personas() -> Vec<PersonaConfig> {
    vec![
        PersonaConfig {
            id: "value_hunter".to_string(),
            name: "Value Hunter".to_string(),
            prompt_template: "You are the Value Hunter, a fantasy football analyst who hunts \
                underpriced players that return the most points per million spent."
                .to_string(),
            rubric: "Weigh value, expected points, goal involvement, threat, minutes, \
                fixture difficulty and bonus points."
                .to_string(),
        },
        PersonaConfig {
            id: "safe_bet".to_string(),
            name: "Safe Bet".to_string(),
            prompt_template: "You are the Safe Bet, a fantasy football analyst who prizes \
                consistency: nailed starters with a reliable points floor."
                .to_string(),
            rubric: "Weigh minutes, starts, influence, expected points, bonus points, \
                team form and fixture."
                .to_string(),
        },
        PersonaConfig {
            id: "differentials_specialist".to_string(),
            name: "Differentials Specialist".to_string(),
            prompt_template: "You are the Differentials Specialist, a fantasy football analyst \
                who targets low-owned players with explosive upside."
                .to_string(),
            rubric: "Weigh ownership, goal involvement, threat, recent form, minutes and \
                fixture swings."
                .to_string(),
        },
    ]
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_tokens_per_candidate: default_max_tokens_per_candidate(),
            temperature: 0.0,
            probability_tolerance: default_probability_tolerance(),
            justification_max_chars: default_justification_max_chars(),
            personas: default_personas(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Retries per (model, credential) route after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions`
    #[default]
    ChatCompletions,
    /// In-process synthetic experts, for offline runs
    Mock,
}

/// A remote reasoning provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Process-wide request rate towards this provider
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

const fn default_requests_per_second() -> u32 {
    5
}

/// A credential for one provider. The secret comes from `api_key_env`
/// unless `api_key` is given inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub id: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

/// One `(provider, model, credential)` entry of the ordered fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackTarget {
    pub provider: String,
    pub model: String,
    pub credential: String,
}

impl FallbackTarget {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            credential: credential.into(),
        }
    }
}

/// Outbound dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatchConfig {
    /// Ceiling on in-flight provider calls across all personas
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-call deadline in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    /// How long a rate-limited credential is tried last
    #[serde(default = "default_credential_cooldown_secs")]
    pub credential_cooldown_secs: u64,

    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    #[serde(default = "default_credentials")]
    pub credentials: Vec<CredentialConfig>,

    #[serde(default = "default_fallback_chain")]
    pub fallback_chain: Vec<FallbackTarget>,
}

const fn default_max_concurrency() -> usize {
    4
}

const fn default_call_timeout_secs() -> u64 {
    60
}

const fn default_credential_cooldown_secs() -> u64 {
    30
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "groq".to_string(),
        kind: ProviderKind::ChatCompletions,
        base_url: default_base_url(),
        requests_per_second: default_requests_per_second(),
    }]
}

fn default_credentials() -> Vec<CredentialConfig> {
    vec![
        CredentialConfig {
            id: "groq-primary".to_string(),
            provider: "groq".to_string(),
            api_key_env: Some("GROQ_API_KEY".to_string()),
            api_key: None,
        },
        CredentialConfig {
            id: "groq-secondary".to_string(),
            provider: "groq".to_string(),
            api_key_env: Some("GROQ_API_KEY_2".to_string()),
            api_key: None,
        },
    ]
}

fn default_fallback_chain() -> Vec<FallbackTarget> {
    let models = [
        "llama-3.1-8b-instant",
        "llama-3.1-70b-versatile",
        "mixtral-8x7b-32768",
    ];
    models
        .iter()
        .flat_map(|model| {
            ["groq-primary", "groq-secondary"]
                .into_iter()
                .map(move |credential| FallbackTarget::new("groq", *model, credential))
        })
        .collect()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            retry: RetryConfig::default(),
            credential_cooldown_secs: default_credential_cooldown_secs(),
            providers: default_providers(),
            credentials: default_credentials(),
            fallback_chain: default_fallback_chain(),
        }
    }
}

/// Consensus merge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConsensusConfig {
    /// Relative persona weights; personas not listed weigh 1.0
    #[serde(default)]
    pub persona_weights: BTreeMap<String, f64>,

    #[serde(default)]
    pub bucket_weights: BucketWeights,

    /// Agreement below this flags a candidate as contested
    #[serde(default = "default_disagreement_threshold")]
    pub disagreement_threshold: f64,

    /// Tickers or Haulers probability that counts as a strong vote
    #[serde(default = "default_strong_pick_probability")]
    pub strong_pick_probability: f64,

    /// Strong votes needed to mark a strong pick
    #[serde(default = "default_strong_pick_votes")]
    pub strong_pick_votes: usize,

    #[serde(default = "default_veto_tickers")]
    pub veto_tickers: f64,

    #[serde(default = "default_veto_haulers")]
    pub veto_haulers: f64,
}

const fn default_disagreement_threshold() -> f64 {
    0.6
}

const fn default_strong_pick_probability() -> f64 {
    0.7
}

const fn default_strong_pick_votes() -> usize {
    2
}

const fn default_veto_tickers() -> f64 {
    0.10
}

const fn default_veto_haulers() -> f64 {
    0.05
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            persona_weights: BTreeMap::new(),
            bucket_weights: BucketWeights::default(),
            disagreement_threshold: default_disagreement_threshold(),
            strong_pick_probability: default_strong_pick_probability(),
            strong_pick_votes: default_strong_pick_votes(),
            veto_tickers: default_veto_tickers(),
            veto_haulers: default_veto_haulers(),
        }
    }
}

impl ConsensusConfig {
    pub fn persona_weight(&self, persona: &str) -> f64 {
        self.persona_weights.get(persona).copied().unwrap_or(1.0)
    }
}

/// Squad constraints and search limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SquadConfig {
    /// Budget ceiling in millions
    #[serde(default = "default_budget")]
    pub budget: f64,

    #[serde(default)]
    pub formation: Formation,

    #[serde(default = "default_max_per_club")]
    pub max_per_club: usize,

    /// Branch-and-bound node budget per search
    #[serde(default = "default_search_node_limit")]
    pub search_node_limit: u64,
}

const fn default_budget() -> f64 {
    100.0
}

const fn default_max_per_club() -> usize {
    3
}

const fn default_search_node_limit() -> u64 {
    2_000_000
}

impl Default for SquadConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            formation: Formation::default(),
            max_per_club: default_max_per_club(),
            search_node_limit: default_search_node_limit(),
        }
    }
}

impl SquadConfig {
    pub const fn constraints(&self) -> SquadConstraints {
        SquadConstraints {
            budget: self.budget,
            formation: self.formation,
            max_per_club: self.max_per_club,
        }
    }
}
