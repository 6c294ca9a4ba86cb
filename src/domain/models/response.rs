//! Caller-facing shape of one pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evaluation::PersonaId;
use super::player::Position;
use super::squad::{Provenance, ScoreSource};

/// One selected player with its scores and reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPlayer {
    pub id: u32,
    pub name: String,
    pub club: String,
    pub position: Position,
    pub price: f64,
    pub ranker_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement: Option<f64>,
    pub high_disagreement: bool,
    pub strong_pick: bool,
    /// Value the squad search optimised.
    pub value: f64,
    pub score_source: ScoreSource,
    pub justification: String,
}

/// How much of the panel's work made it into consensus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub shortlisted: usize,
    pub requests: usize,
    pub failed_requests: usize,
    pub valid_results: usize,
    pub invalid_results: usize,
    pub consensus_candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaSummary {
    pub persona: PersonaId,
    pub valid: usize,
    pub invalid: usize,
}

/// Everything the serving layer needs to render a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub budget: f64,
    pub total_price: f64,
    pub remaining_budget: f64,
    pub total_score: f64,
    pub players: Vec<SelectedPlayer>,
    pub coverage: Coverage,
    pub personas: Vec<PersonaSummary>,
}
