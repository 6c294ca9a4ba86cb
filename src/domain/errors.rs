//! Error taxonomy for the squad selection pipeline.
//!
//! Only [`PipelineError`] ever reaches a caller. Provider failures are
//! absorbed by the dispatcher, parse failures become invalid evaluation
//! results, and constraint failures on the primary path fall through to the
//! deterministic fallback.

use thiserror::Error;

use super::models::player::Position;

/// The stat snapshot cannot support even the degraded ranking path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("No player records supplied")]
    Empty,

    #[error("No player has complete data for criteria [{}]", .criteria.join(", "))]
    NoCompleteRecords { criteria: Vec<String> },

    #[error("No ranking criteria configured")]
    NoCriteria,

    #[error("Duplicate player id in snapshot: {0}")]
    DuplicatePlayer(u32),

    #[error("Snapshot has no gameweek rows before gameweek {0}")]
    NoRoundsBefore(u32),

    #[error("Failed to read snapshot {path}: {reason}")]
    Snapshot { path: String, reason: String },
}

/// A response from a persona could not be read as per-candidate judgments.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Response contains no JSON array")]
    NoJsonArray,

    #[error("Response JSON is invalid: {0}")]
    InvalidJson(String),

    #[error("Candidate {0} missing from response")]
    MissingCandidate(u32),

    #[error("Bucket {bucket} is missing or not a number")]
    MissingBucket { bucket: &'static str },

    #[error("Bucket {bucket} has invalid probability {value}")]
    InvalidProbability { bucket: &'static str, value: f64 },

    #[error("Probabilities sum to {sum:.3}, outside tolerance {tolerance}")]
    SumOutOfTolerance { sum: f64, tolerance: f64 },

    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),
}

/// The squad search could not produce a legal squad.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintError {
    #[error("Not enough {position} candidates: have {available}, need {required}")]
    InsufficientCandidates {
        position: Position,
        available: usize,
        required: usize,
    },

    #[error("Consensus covers {covered} {position} candidates, need {required}")]
    InsufficientCoverage {
        position: Position,
        covered: usize,
        required: usize,
    },

    #[error("Non-finite score for candidate {0}")]
    MalformedScore(u32),

    #[error("Search exhausted after {nodes} nodes without a feasible squad")]
    SearchExhausted { nodes: u64 },

    #[error("Squad breaks constraints: {0}")]
    Violations(String),

    #[error("No feasible squad under budget {budget} with club cap {max_per_club}")]
    Infeasible { budget: f64, max_per_club: usize },
}

/// Errors surfaced to the caller of the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// The fallback itself found nothing: the snapshot is too thin to fill a squad.
    #[error("Squad construction failed: {0}")]
    Constraint(#[from] ConstraintError),

    #[error("Pipeline run cancelled")]
    Cancelled,
}

pub type PipelineResult<T> = Result<T, PipelineError>;
