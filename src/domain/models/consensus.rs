use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::evaluation::{OutcomeDistribution, PersonaId};

/// Merged judgment for one candidate across all personas that produced a
/// valid result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusScore {
    pub candidate_id: u32,
    /// Weighted average of persona distributions, summing to 1.0.
    pub distribution: OutcomeDistribution,
    /// Outcome score mapped onto `[0, 1]`.
    pub merged_score: f64,
    /// 1.0 when personas agree exactly, falling towards 0.0 as they diverge.
    pub agreement: f64,
    pub high_disagreement: bool,
    /// Enough personas rated a big return as likely.
    pub strong_pick: bool,
    /// Merged odds of any return are negligible.
    pub vetoed: bool,
    pub contributors: Vec<PersonaId>,
    pub justification: String,
}

/// Output of the consensus stage for a whole shortlist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    /// Scores keyed by candidate id.
    pub scores: BTreeMap<u32, ConsensusScore>,
    /// Candidates that received zero valid results.
    pub no_consensus: Vec<u32>,
}

impl ConsensusReport {
    pub fn get(&self, candidate_id: u32) -> Option<&ConsensusScore> {
        self.scores.get(&candidate_id)
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }
}
