//! Pundit - fantasy squad selection pipeline
//!
//! Picks a legal fifteen-player squad from a snapshot of player stats:
//! a TOPSIS ranker shrinks the pool, three configured expert personas judge
//! the shortlist through a fault-tolerant dispatcher, their judgments are
//! merged into consensus scores, and a constrained search builds the squad.
//! When the reasoning layer fails, a deterministic ranker-only fallback
//! still returns a legal squad.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, ports and the error taxonomy
//! - **Service Layer** (`services`): the pipeline stages and their orchestration
//! - **Infrastructure Layer** (`infrastructure`): config, logging, HTTP provider, snapshot loading
//! - **Adapters** (`adapters`): provider registry and the mock provider
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use pundit::{ConfigLoader, SquadPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     // build providers, resolve credentials, then SquadPipeline::from_config(...)
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ConstraintError, InputError, ParseError, PipelineError, PipelineResult};
pub use domain::models::{
    Config, ConsensusScore, EvaluationResult, PipelineResponse, PlayerRecord, Position,
    Provenance, RankedCandidate, Squad,
};
pub use domain::ports::{ReasoningProvider, StatSource};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ConsensusEngine, Dispatcher, Ranker, SquadBuilder, SquadPipeline};
