//! Evaluation requests sent to the expert panel and the judgments that come back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a configured persona (e.g. `value_hunter`).
pub type PersonaId = String;

/// Line that precedes the candidate JSON array in every user prompt.
pub const CANDIDATES_HEADER: &str = "Candidates:";

/// Probability over the four gameweek outcome buckets.
///
/// Buckets: Zeros (0 pts), Blanks (1-2 pts), Tickers (3-7 pts), Haulers (8+ pts).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeDistribution {
    #[serde(rename = "Zeros")]
    pub zeros: f64,
    #[serde(rename = "Blanks")]
    pub blanks: f64,
    #[serde(rename = "Tickers")]
    pub tickers: f64,
    #[serde(rename = "Haulers")]
    pub haulers: f64,
}

impl OutcomeDistribution {
    /// Uniform distribution over all buckets.
    pub const NEUTRAL: Self = Self {
        zeros: 0.25,
        blanks: 0.25,
        tickers: 0.25,
        haulers: 0.25,
    };

    pub const fn new(zeros: f64, blanks: f64, tickers: f64, haulers: f64) -> Self {
        Self {
            zeros,
            blanks,
            tickers,
            haulers,
        }
    }

    pub const fn as_array(&self) -> [f64; 4] {
        [self.zeros, self.blanks, self.tickers, self.haulers]
    }

    pub const fn from_array(values: [f64; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// Rescale so the buckets sum to exactly 1.0. Returns `None` for a zero
    /// or non-finite total.
    pub fn normalized(&self) -> Option<Self> {
        let total = self.sum();
        if !total.is_finite() || total <= 0.0 {
            return None;
        }
        Some(Self::from_array(self.as_array().map(|v| v / total)))
    }

    /// Weighted outcome score: `sum(bucket_probability * bucket_weight)`.
    pub fn weighted_score(&self, weights: &BucketWeights) -> f64 {
        self.as_array()
            .iter()
            .zip(weights.as_array())
            .map(|(p, w)| p * w)
            .sum()
    }
}

/// Points-like weight assigned to each outcome bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BucketWeights {
    pub zeros: f64,
    pub blanks: f64,
    pub tickers: f64,
    pub haulers: f64,
}

impl Default for BucketWeights {
    fn default() -> Self {
        Self {
            zeros: 0.0,
            blanks: 0.0,
            tickers: 1.0,
            haulers: 2.0,
        }
    }
}

impl BucketWeights {
    pub const fn as_array(&self) -> [f64; 4] {
        [self.zeros, self.blanks, self.tickers, self.haulers]
    }

    /// Largest weight, used to map outcome scores onto `[0, 1]`.
    pub fn max_weight(&self) -> f64 {
        self.as_array().into_iter().fold(0.0, f64::max)
    }
}

/// Prompt content for one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPayload {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// One batch of candidates to be judged by one persona.
///
/// Created per chunk by the expert panel and consumed exactly once by the
/// dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub id: Uuid,
    pub persona: PersonaId,
    pub candidate_ids: Vec<u32>,
    pub payload: PromptPayload,
}

impl EvaluationRequest {
    pub fn new(persona: impl Into<PersonaId>, candidate_ids: Vec<u32>, payload: PromptPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            persona: persona.into(),
            candidate_ids,
            payload,
        }
    }
}

/// Whether a judgment can be used by the consensus stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Validity {
    Valid,
    Invalid {
        reason: String,
        /// Raw model text kept for diagnostics.
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
}

/// One persona's judgment about one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub candidate_id: u32,
    pub persona: PersonaId,
    /// Normalized distribution; `None` when invalid.
    pub distribution: Option<OutcomeDistribution>,
    pub justification: String,
    pub validity: Validity,
}

impl EvaluationResult {
    pub fn valid(
        candidate_id: u32,
        persona: impl Into<PersonaId>,
        distribution: OutcomeDistribution,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            candidate_id,
            persona: persona.into(),
            distribution: Some(distribution),
            justification: justification.into(),
            validity: Validity::Valid,
        }
    }

    pub fn invalid(
        candidate_id: u32,
        persona: impl Into<PersonaId>,
        reason: impl Into<String>,
        raw: Option<String>,
    ) -> Self {
        Self {
            candidate_id,
            persona: persona.into(),
            distribution: None,
            justification: String::new(),
            validity: Validity::Invalid {
                reason: reason.into(),
                raw,
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.validity, Validity::Valid) && self.distribution.is_some()
    }
}
