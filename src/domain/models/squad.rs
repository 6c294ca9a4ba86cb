//! The final fifteen-player squad and the constraints it must satisfy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::player::{Position, SharedPlayer};

/// Squad size fixed by the game rules.
pub const SQUAD_SIZE: usize = 15;

/// Tolerance for floating point budget comparisons.
pub const BUDGET_EPSILON: f64 = 1e-9;

/// Required number of players per position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Formation {
    #[serde(default = "default_goalkeepers")]
    pub goalkeepers: usize,
    #[serde(default = "default_defenders")]
    pub defenders: usize,
    #[serde(default = "default_midfielders")]
    pub midfielders: usize,
    #[serde(default = "default_forwards")]
    pub forwards: usize,
}

const fn default_goalkeepers() -> usize {
    2
}

const fn default_defenders() -> usize {
    5
}

const fn default_midfielders() -> usize {
    5
}

const fn default_forwards() -> usize {
    3
}

impl Default for Formation {
    fn default() -> Self {
        Self {
            goalkeepers: default_goalkeepers(),
            defenders: default_defenders(),
            midfielders: default_midfielders(),
            forwards: default_forwards(),
        }
    }
}

impl Formation {
    pub const fn required(&self, position: Position) -> usize {
        match position {
            Position::Goalkeeper => self.goalkeepers,
            Position::Defender => self.defenders,
            Position::Midfielder => self.midfielders,
            Position::Forward => self.forwards,
        }
    }

    /// Requirements as a dense array indexed by [`Position::index`].
    pub const fn as_array(&self) -> [usize; 4] {
        [
            self.goalkeepers,
            self.defenders,
            self.midfielders,
            self.forwards,
        ]
    }

    pub const fn total(&self) -> usize {
        self.goalkeepers + self.defenders + self.midfielders + self.forwards
    }
}

/// Hard constraints every squad must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquadConstraints {
    pub budget: f64,
    pub formation: Formation,
    pub max_per_club: usize,
}

impl Default for SquadConstraints {
    fn default() -> Self {
        Self {
            budget: 100.0,
            formation: Formation::default(),
            max_per_club: 3,
        }
    }
}

/// How the squad was produced. Always recorded on the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    ConsensusBuilt,
    FallbackBuilt,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConsensusBuilt => f.write_str("consensus-built"),
            Self::FallbackBuilt => f.write_str("fallback-built"),
        }
    }
}

/// Where a slot's optimisation value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Consensus,
    Ranker,
}

/// One selected player and the value the solver assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadSlot {
    pub player: SharedPlayer,
    pub value: f64,
    pub source: ScoreSource,
}

/// A rule broken by a candidate squad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintViolation {
    SquadSize { actual: usize, required: usize },
    Budget { spent: f64, budget: f64 },
    Formation { position: Position, actual: usize, required: usize },
    ClubCap { club: String, count: usize, cap: usize },
    DuplicatePlayer { id: u32 },
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SquadSize { actual, required } => {
                write!(f, "selected_count={actual} != {required}")
            }
            Self::Budget { spent, budget } => write!(f, "budget_exceeded={spent:.1} > {budget}"),
            Self::Formation {
                position,
                actual,
                required,
            } => write!(f, "pos_{position}={actual} != {required}"),
            Self::ClubCap { club, count, cap } => write!(f, "club_{club}={count} > {cap}"),
            Self::DuplicatePlayer { id } => write!(f, "duplicate_player={id}"),
        }
    }
}

/// Exactly fifteen players satisfying [`SquadConstraints`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Squad {
    /// Ordered by position, then value descending, then id.
    pub slots: Vec<SquadSlot>,
    pub provenance: Provenance,
    /// Why the fallback path was taken, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl Squad {
    pub fn new(mut slots: Vec<SquadSlot>, provenance: Provenance) -> Self {
        slots.sort_by(|a, b| {
            a.player
                .position
                .cmp(&b.player.position)
                .then_with(|| b.value.total_cmp(&a.value))
                .then_with(|| a.player.id.cmp(&b.player.id))
        });
        Self {
            slots,
            provenance,
            fallback_reason: None,
        }
    }

    pub fn with_fallback_reason(mut self, reason: impl Into<String>) -> Self {
        self.fallback_reason = Some(reason.into());
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_price(&self) -> f64 {
        self.slots.iter().map(|s| s.player.price).sum()
    }

    pub fn total_value(&self) -> f64 {
        self.slots.iter().map(|s| s.value).sum()
    }

    pub fn player_ids(&self) -> Vec<u32> {
        self.slots.iter().map(|s| s.player.id).collect()
    }

    pub fn count_position(&self, position: Position) -> usize {
        self.slots
            .iter()
            .filter(|s| s.player.position == position)
            .count()
    }

    pub fn count_club(&self, club: &str) -> usize {
        self.slots.iter().filter(|s| s.player.club == club).count()
    }

    /// Every constraint this squad breaks; empty when the squad is legal.
    pub fn violations(&self, constraints: &SquadConstraints) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        if self.slots.len() != constraints.formation.total() {
            violations.push(ConstraintViolation::SquadSize {
                actual: self.slots.len(),
                required: constraints.formation.total(),
            });
        }

        let spent = self.total_price();
        if spent > constraints.budget + BUDGET_EPSILON {
            violations.push(ConstraintViolation::Budget {
                spent,
                budget: constraints.budget,
            });
        }

        for position in Position::ALL {
            let actual = self.count_position(position);
            let required = constraints.formation.required(position);
            if actual != required {
                violations.push(ConstraintViolation::Formation {
                    position,
                    actual,
                    required,
                });
            }
        }

        let mut clubs: BTreeMap<&str, usize> = BTreeMap::new();
        for slot in &self.slots {
            *clubs.entry(slot.player.club.as_str()).or_default() += 1;
        }
        for (club, count) in clubs {
            if count > constraints.max_per_club {
                violations.push(ConstraintViolation::ClubCap {
                    club: club.to_string(),
                    count,
                    cap: constraints.max_per_club,
                });
            }
        }

        let mut seen = HashSet::new();
        for slot in &self.slots {
            if !seen.insert(slot.player.id) {
                violations.push(ConstraintViolation::DuplicatePlayer { id: slot.player.id });
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::player::PlayerRecord;
    use std::sync::Arc;

    fn slot(id: u32, club: &str, position: Position, price: f64) -> SquadSlot {
        SquadSlot {
            player: Arc::new(PlayerRecord::new(id, format!("P{id}"), club, position, price)),
            value: f64::from(id) / 100.0,
            source: ScoreSource::Ranker,
        }
    }

    fn legal_slots() -> Vec<SquadSlot> {
        let layout = [
            (Position::Goalkeeper, 2),
            (Position::Defender, 5),
            (Position::Midfielder, 5),
            (Position::Forward, 3),
        ];
        let mut slots = Vec::new();
        let mut id = 1;
        for (position, count) in layout {
            for _ in 0..count {
                slots.push(slot(id, &format!("C{}", id % 8), position, 6.0));
                id += 1;
            }
        }
        slots
    }

    #[test]
    fn test_legal_squad_has_no_violations() {
        let squad = Squad::new(legal_slots(), Provenance::FallbackBuilt);
        assert!(squad.violations(&SquadConstraints::default()).is_empty());
        assert_eq!(squad.len(), SQUAD_SIZE);
        assert!((squad.total_price() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_detects_budget_and_club_violations() {
        let mut slots = legal_slots();
        for s in slots.iter_mut().take(4) {
            let mut record = (*s.player).clone();
            record.club = "ARS".to_string();
            record.price = 12.0;
            s.player = Arc::new(record);
        }
        let squad = Squad::new(slots, Provenance::ConsensusBuilt);
        let violations = squad.violations(&SquadConstraints::default());

        assert!(violations
            .iter()
            .any(|v| matches!(v, ConstraintViolation::Budget { .. })));
        assert!(violations.iter().any(|v| matches!(
            v,
            ConstraintViolation::ClubCap { club, count: 4, cap: 3 } if club == "ARS"
        )));
    }

    #[test]
    fn test_detects_formation_and_duplicates() {
        let mut slots = legal_slots();
        slots.pop();
        slots.push(slot(1, "C9", Position::Goalkeeper, 4.0));
        let squad = Squad::new(slots, Provenance::FallbackBuilt);
        let violations = squad.violations(&SquadConstraints::default());

        assert!(violations.contains(&ConstraintViolation::DuplicatePlayer { id: 1 }));
        assert!(violations.contains(&ConstraintViolation::Formation {
            position: Position::Forward,
            actual: 2,
            required: 3,
        }));
    }

    #[test]
    fn test_provenance_wire_format() {
        assert_eq!(
            serde_json::to_string(&Provenance::FallbackBuilt).unwrap(),
            "\"fallback-built\""
        );
        assert_eq!(Provenance::ConsensusBuilt.to_string(), "consensus-built");
    }
}
