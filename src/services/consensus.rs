//! Consensus merge across persona judgments.
//!
//! A pure function of its input: results are grouped per candidate and per
//! persona in sorted order, so the same result set always yields the same
//! report regardless of arrival order.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::domain::models::{
    ConsensusConfig, ConsensusReport, ConsensusScore, EvaluationResult, OutcomeDistribution,
    PersonaId,
};

/// Separator between persona justifications in the merged text.
const JUSTIFICATION_SEPARATOR: &str = " | ";

#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
}

struct Vote<'a> {
    persona: &'a PersonaId,
    distribution: OutcomeDistribution,
    justification: &'a str,
}

impl ConsensusEngine {
    pub const fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Merge every valid result for the given candidates.
    ///
    /// Candidates without a single valid result are listed in
    /// `no_consensus` and get no score. Results for candidates outside
    /// `candidate_ids` are ignored.
    pub fn merge<'a>(
        &self,
        candidate_ids: &[u32],
        results: impl IntoIterator<Item = &'a EvaluationResult>,
    ) -> ConsensusReport {
        let mut grouped: BTreeMap<u32, BTreeMap<&PersonaId, Vote<'_>>> = candidate_ids
            .iter()
            .map(|id| (*id, BTreeMap::new()))
            .collect();

        for result in results {
            let Some(distribution) = result.distribution.filter(|_| result.is_valid()) else {
                continue;
            };
            let Some(votes) = grouped.get_mut(&result.candidate_id) else {
                continue;
            };
            votes.entry(&result.persona).or_insert(Vote {
                persona: &result.persona,
                distribution,
                justification: &result.justification,
            });
        }

        let mut report = ConsensusReport::default();
        for (candidate_id, votes) in grouped {
            let votes: Vec<Vote<'_>> = votes.into_values().collect();
            match self.score(candidate_id, &votes) {
                Some(score) => {
                    report.scores.insert(candidate_id, score);
                }
                None => report.no_consensus.push(candidate_id),
            }
        }

        let contested = report.scores.values().filter(|s| s.high_disagreement).count();
        info!(
            scored = report.scores.len(),
            no_consensus = report.no_consensus.len(),
            contested,
            "Consensus merged"
        );
        report
    }

    fn score(&self, candidate_id: u32, votes: &[Vote<'_>]) -> Option<ConsensusScore> {
        if votes.is_empty() {
            return None;
        }
        let weights = self.vote_weights(votes);

        let mut merged = [0.0; 4];
        for (vote, weight) in votes.iter().zip(&weights) {
            for (slot, p) in merged.iter_mut().zip(vote.distribution.as_array()) {
                *slot += weight * p;
            }
        }
        let distribution = OutcomeDistribution::from_array(merged).normalized()?;

        let persona_scores: Vec<f64> = votes
            .iter()
            .map(|vote| self.outcome_score(&vote.distribution))
            .collect();
        let merged_score = self.outcome_score(&distribution);
        let agreement = agreement(&persona_scores, &weights);
        let high_disagreement = votes.len() > 1 && agreement < self.config.disagreement_threshold;

        let threshold = self.config.strong_pick_probability;
        let strong_votes = votes
            .iter()
            .filter(|v| v.distribution.tickers >= threshold || v.distribution.haulers >= threshold)
            .count();
        let strong_pick = strong_votes >= self.config.strong_pick_votes;
        let vetoed = distribution.tickers <= self.config.veto_tickers
            && distribution.haulers <= self.config.veto_haulers;

        if high_disagreement {
            debug!(candidate = candidate_id, agreement, "High persona disagreement");
        }

        Some(ConsensusScore {
            candidate_id,
            distribution,
            merged_score,
            agreement,
            high_disagreement,
            strong_pick,
            vetoed,
            contributors: votes.iter().map(|v| v.persona.clone()).collect(),
            justification: votes
                .iter()
                .map(|v| format!("{}: {}", v.persona, v.justification))
                .collect::<Vec<_>>()
                .join(JUSTIFICATION_SEPARATOR),
        })
    }

    /// Persona weights normalised over the personas present. Falls back to
    /// equal weights when every configured weight is zero.
    fn vote_weights(&self, votes: &[Vote<'_>]) -> Vec<f64> {
        let raw: Vec<f64> = votes
            .iter()
            .map(|v| {
                let w = self.config.persona_weight(v.persona);
                if w.is_finite() && w > 0.0 {
                    w
                } else {
                    0.0
                }
            })
            .collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            raw.iter().map(|w| w / total).collect()
        } else {
            vec![1.0 / votes.len() as f64; votes.len()]
        }
    }

    /// Outcome score on `[0, 1]`.
    fn outcome_score(&self, distribution: &OutcomeDistribution) -> f64 {
        let max = self.config.bucket_weights.max_weight();
        if max <= 0.0 {
            return 0.0;
        }
        (distribution.weighted_score(&self.config.bucket_weights) / max).clamp(0.0, 1.0)
    }
}

/// `1 - 2σ` of the weighted persona scores, clamped to `[0, 1]`.
fn agreement(scores: &[f64], weights: &[f64]) -> f64 {
    if scores.len() < 2 {
        return 1.0;
    }
    let mean: f64 = scores.iter().zip(weights).map(|(s, w)| s * w).sum();
    let variance: f64 = scores
        .iter()
        .zip(weights)
        .map(|(s, w)| w * (s - mean).powi(2))
        .sum();
    (1.0 - 2.0 * variance.sqrt()).clamp(0.0, 1.0)
}
