//! Domain models for the squad selection pipeline

pub mod config;
pub mod consensus;
pub mod evaluation;
pub mod player;
pub mod ranking;
pub mod response;
pub mod squad;

pub use config::{
    Config, ConsensusConfig, CredentialConfig, Criterion, DispatchConfig, FallbackTarget,
    LoggingConfig, Normalization, PanelConfig, PersonaConfig, Polarity, ProviderConfig,
    ProviderKind, RankingConfig, RetryConfig, SquadConfig,
};
pub use consensus::{ConsensusReport, ConsensusScore};
pub use evaluation::{
    BucketWeights, EvaluationRequest, EvaluationResult, OutcomeDistribution, PersonaId,
    PromptPayload, Validity, CANDIDATES_HEADER,
};
pub use player::{PlayerRecord, Position, SharedPlayer, PRICE_CRITERION};
pub use ranking::RankedCandidate;
pub use response::{Coverage, PersonaSummary, PipelineResponse, SelectedPlayer};
pub use squad::{
    ConstraintViolation, Formation, Provenance, ScoreSource, Squad, SquadConstraints, SquadSlot,
    BUDGET_EPSILON, SQUAD_SIZE,
};
