//! TOPSIS ranking pre-filter.
//!
//! Scores every player with complete criteria by relative closeness to the
//! ideal profile and cuts the pool down to a shortlist for the expert panel.
//! The full scored pool is kept as well; the deterministic squad fallback
//! searches it.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::domain::errors::InputError;
use crate::domain::models::{
    Formation, Normalization, Polarity, Position, RankedCandidate, RankingConfig, SharedPlayer,
};

/// Keeps the closeness ratio defined when both distances are zero.
const CLOSENESS_EPSILON: f64 = 1e-9;

/// Output of one ranking pass.
#[derive(Debug, Clone)]
pub struct Ranking {
    /// Top-K candidates, score descending then id ascending.
    pub shortlist: Vec<RankedCandidate>,
    /// Every eligible player in the same order.
    pub pool: Vec<RankedCandidate>,
    /// K as configured.
    pub requested: usize,
    /// Players dropped for missing data or unavailability.
    pub excluded: usize,
}

impl Ranking {
    /// True when K had to shrink to the number of complete records.
    pub fn is_degraded(&self) -> bool {
        self.shortlist.len() < self.requested
    }
}

/// TOPSIS ranker over a fixed criteria set.
#[derive(Debug, Clone)]
pub struct Ranker {
    config: RankingConfig,
    formation: Formation,
}

impl Ranker {
    pub fn new(config: RankingConfig, formation: Formation) -> Self {
        Self { config, formation }
    }

    /// Score all eligible players and select the shortlist.
    ///
    /// Fewer than K complete records is a degraded input: K shrinks to the
    /// number of complete records. Only an empty eligible set is an error.
    pub fn rank(&self, players: &[SharedPlayer]) -> Result<Ranking, InputError> {
        if players.is_empty() {
            return Err(InputError::Empty);
        }
        let weights = self.normalized_weights()?;
        let keys: Vec<&str> = self.config.criteria.iter().map(|c| c.name.as_str()).collect();

        let mut eligible: Vec<&SharedPlayer> = players
            .iter()
            .filter(|p| p.available && p.has_complete_criteria(keys.iter().copied()))
            .collect();
        if eligible.is_empty() {
            return Err(InputError::NoCompleteRecords {
                criteria: keys.iter().map(ToString::to_string).collect(),
            });
        }
        // Column sums must not depend on snapshot order.
        eligible.sort_by_key(|p| p.id);
        let excluded = players.len() - eligible.len();

        let scores = self.closeness(&eligible, &keys, &weights);
        let mut scored: Vec<(SharedPlayer, f64)> = eligible
            .into_iter()
            .cloned()
            .zip(scores)
            .collect();
        scored.sort_by(|(a, sa), (b, sb)| RankedCandidate::ranking_order(*sa, a.id, *sb, b.id));

        let requested = self.config.shortlist_size;
        let k = requested.min(scored.len());
        if k < requested {
            warn!(
                requested,
                effective = k,
                excluded,
                "Fewer complete records than shortlist size, shrinking shortlist"
            );
        }

        let selected = if self.config.position_aware {
            self.position_aware_selection(&scored, k)
        } else {
            scored.iter().take(k).cloned().collect()
        };

        let shortlist = to_candidates(selected);
        let pool = to_candidates(scored);

        info!(
            shortlisted = shortlist.len(),
            pool = pool.len(),
            excluded,
            "Ranking complete"
        );

        Ok(Ranking {
            shortlist,
            pool,
            requested,
            excluded,
        })
    }

    fn normalized_weights(&self) -> Result<Vec<f64>, InputError> {
        let total: f64 = self.config.criteria.iter().map(|c| c.weight).sum();
        if self.config.criteria.is_empty() || !total.is_finite() || total <= 0.0 {
            return Err(InputError::NoCriteria);
        }
        Ok(self.config.criteria.iter().map(|c| c.weight / total).collect())
    }

    /// Closeness coefficient per player, in input order.
    fn closeness(&self, players: &[&SharedPlayer], keys: &[&str], weights: &[f64]) -> Vec<f64> {
        let columns = keys.len();
        let mut matrix: Vec<Vec<f64>> = players
            .iter()
            .map(|p| {
                keys.iter()
                    .map(|key| p.criterion_value(key).unwrap_or(0.0))
                    .collect()
            })
            .collect();

        for j in 0..columns {
            let column: Vec<f64> = matrix.iter().map(|row| row[j]).collect();
            let normalized = normalize_column(&column, self.config.normalization);
            for (row, value) in matrix.iter_mut().zip(normalized) {
                row[j] = value * weights[j];
            }
        }

        let mut best = vec![0.0; columns];
        let mut worst = vec![0.0; columns];
        for (j, criterion) in self.config.criteria.iter().enumerate() {
            let (min, max) = matrix.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
                (lo.min(row[j]), hi.max(row[j]))
            });
            match criterion.polarity {
                Polarity::HigherIsBetter => {
                    best[j] = max;
                    worst[j] = min;
                }
                Polarity::LowerIsBetter => {
                    best[j] = min;
                    worst[j] = max;
                }
            }
        }

        matrix
            .iter()
            .map(|row| {
                let to_best = euclidean(row, &best);
                let to_worst = euclidean(row, &worst);
                to_worst / (to_best + to_worst + CLOSENESS_EPSILON)
            })
            .collect()
    }

    /// Reserve places per position in proportion to the formation, then fill
    /// the rest best-first.
    fn position_aware_selection(
        &self,
        scored: &[(SharedPlayer, f64)],
        k: usize,
    ) -> Vec<(SharedPlayer, f64)> {
        let total = self.formation.total().max(1);
        let mut chosen: HashSet<u32> = HashSet::with_capacity(k);
        let mut selected = Vec::with_capacity(k);

        for position in Position::ALL {
            let required = self.formation.required(position);
            if required == 0 {
                continue;
            }
            let quota = ((k * required) as f64 / total as f64).round().max(1.0) as usize;
            let picks: Vec<_> = scored
                .iter()
                .filter(|(p, _)| p.position == position)
                .take(quota)
                .cloned()
                .collect();
            debug!(%position, quota, taken = picks.len(), "Position quota");
            for pick in picks {
                chosen.insert(pick.0.id);
                selected.push(pick);
            }
        }

        for entry in scored {
            if selected.len() >= k {
                break;
            }
            if chosen.insert(entry.0.id) {
                selected.push(entry.clone());
            }
        }

        selected.sort_by(|(a, sa), (b, sb)| RankedCandidate::ranking_order(*sa, a.id, *sb, b.id));
        selected.truncate(k);
        selected
    }
}

fn to_candidates(scored: Vec<(SharedPlayer, f64)>) -> Vec<RankedCandidate> {
    scored
        .into_iter()
        .enumerate()
        .map(|(i, (record, score))| RankedCandidate {
            record,
            score,
            rank: i + 1,
        })
        .collect()
}

fn normalize_column(column: &[f64], method: Normalization) -> Vec<f64> {
    match method {
        Normalization::Vector => {
            let norm = column.iter().map(|v| v * v).sum::<f64>().sqrt();
            let divisor = if norm > 0.0 { norm } else { 1.0 };
            column.iter().map(|v| v / divisor).collect()
        }
        Normalization::MinMax => {
            let min = column.iter().copied().fold(f64::INFINITY, f64::min);
            let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;
            if range > 0.0 {
                column.iter().map(|v| (v - min) / range).collect()
            } else {
                vec![1.0; column.len()]
            }
        }
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
