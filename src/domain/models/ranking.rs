use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::player::{Position, SharedPlayer};

/// A player that survived the ranking pre-filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub record: SharedPlayer,
    /// Closeness to the ideal solution, in `[0, 1]`.
    pub score: f64,
    /// 1-based rank within the shortlist.
    pub rank: usize,
}

impl RankedCandidate {
    pub fn id(&self) -> u32 {
        self.record.id
    }

    pub fn position(&self) -> Position {
        self.record.position
    }

    /// Total order used everywhere candidates are sorted: score descending,
    /// then player id ascending.
    pub fn ranking_order(a_score: f64, a_id: u32, b_score: f64, b_id: u32) -> Ordering {
        b_score.total_cmp(&a_score).then_with(|| a_id.cmp(&b_id))
    }
}
