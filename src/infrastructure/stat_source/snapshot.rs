//! JSON snapshot stat source.
//!
//! Accepts either a ready list of player records or raw per-gameweek rows,
//! which are aggregated into season-to-date stats before the target
//! gameweek.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::errors::InputError;
use crate::domain::models::{PlayerRecord, Position};
use crate::domain::ports::StatSource;

/// Price used when a row carries neither `now_cost` nor `price`.
const DEFAULT_PRICE: f64 = 5.0;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Players { players: Vec<PlayerRecord> },
    GameweekRows { gameweek_rows: Vec<GameweekRow> },
}

/// One player's line for one gameweek, as published by public data dumps.
#[derive(Debug, Clone, Deserialize)]
pub struct GameweekRow {
    #[serde(alias = "player_id", alias = "id")]
    pub element: u32,
    #[serde(default = "unknown", alias = "web_name")]
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub element_type: Option<u8>,
    #[serde(default = "unknown", alias = "team_name", alias = "club")]
    pub team: String,
    /// Price in tenths of a million
    #[serde(default)]
    pub now_cost: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, alias = "points")]
    pub total_points: f64,
    #[serde(default)]
    pub minutes: f64,
    #[serde(default)]
    pub goals_scored: f64,
    #[serde(default)]
    pub assists: f64,
    #[serde(alias = "gw")]
    pub round: u32,
}

fn unknown() -> String {
    "Unknown".to_string()
}

impl GameweekRow {
    fn resolved_position(&self) -> Option<Position> {
        self.position
            .as_deref()
            .and_then(Position::from_code)
            .or_else(|| self.element_type.and_then(Position::from_element_type))
    }

    fn resolved_price(&self) -> f64 {
        self.now_cost
            .map(|tenths| tenths / 10.0)
            .or(self.price)
            .unwrap_or(DEFAULT_PRICE)
    }
}

#[derive(Debug)]
struct Aggregate {
    last: GameweekRow,
    total_points: f64,
    minutes: f64,
    goals_scored: f64,
    assists: f64,
    appearances: u32,
}

/// Aggregate gameweek rows into one record per player.
///
/// With a target gameweek, only rounds strictly before it count (just
/// round 1 when the target is 1 or less). Name, position, club and price
/// come from the latest counted round.
pub fn aggregate_gameweeks(
    rows: &[GameweekRow],
    target_gameweek: Option<u32>,
) -> Result<Vec<PlayerRecord>, InputError> {
    let in_window = |round: u32| match target_gameweek {
        None => true,
        Some(target) if target <= 1 => round == 1,
        Some(target) => round < target,
    };

    let mut selected: Vec<&GameweekRow> = rows.iter().filter(|r| in_window(r.round)).collect();
    if selected.is_empty() {
        return Err(InputError::NoRoundsBefore(target_gameweek.unwrap_or(0)));
    }
    selected.sort_by_key(|r| r.round);

    let mut aggregates: BTreeMap<u32, Aggregate> = BTreeMap::new();
    for row in selected {
        let entry = aggregates.entry(row.element).or_insert_with(|| Aggregate {
            last: row.clone(),
            total_points: 0.0,
            minutes: 0.0,
            goals_scored: 0.0,
            assists: 0.0,
            appearances: 0,
        });
        entry.last = row.clone();
        entry.total_points += row.total_points;
        entry.minutes += row.minutes;
        entry.goals_scored += row.goals_scored;
        entry.assists += row.assists;
        entry.appearances += 1;
    }

    let mut records = Vec::with_capacity(aggregates.len());
    for (id, agg) in aggregates {
        let Some(position) = agg.last.resolved_position() else {
            warn!(player = id, "Skipping player with unknown position");
            continue;
        };
        let price = agg.last.resolved_price();
        let appearances = f64::from(agg.appearances);
        let pts_per_appearance = if appearances > 0.0 {
            agg.total_points / appearances
        } else {
            0.0
        };
        let pts_per_90 = if agg.minutes > 0.0 {
            agg.total_points / (agg.minutes / 90.0)
        } else {
            0.0
        };
        let value_season = if price > 0.0 {
            agg.total_points / price
        } else {
            0.0
        };

        records.push(
            PlayerRecord::new(id, agg.last.name.clone(), agg.last.team.clone(), position, price)
                .with_stat("total_points", agg.total_points)
                .with_stat("minutes", agg.minutes)
                .with_stat("goals_scored", agg.goals_scored)
                .with_stat("assists", agg.assists)
                .with_stat("appearances", appearances)
                .with_stat("pts_per_appearance", pts_per_appearance)
                .with_stat("pts_per_90", pts_per_90)
                .with_stat("expected_points", pts_per_90)
                .with_stat("value_season", value_season),
        );
    }

    Ok(records)
}

/// Stat source backed by a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonSnapshotSource {
    path: PathBuf,
    gameweek: Option<u32>,
}

impl JsonSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gameweek: None,
        }
    }

    /// Aggregate gameweek rows up to (not including) `gameweek`.
    #[must_use]
    pub const fn with_gameweek(mut self, gameweek: Option<u32>) -> Self {
        self.gameweek = gameweek;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse snapshot JSON text.
    pub fn parse(&self, text: &str) -> Result<Vec<PlayerRecord>, InputError> {
        let file: SnapshotFile = serde_json::from_str(text).map_err(|e| self.read_error(e))?;
        let records = match file {
            SnapshotFile::Players { players } => players,
            SnapshotFile::GameweekRows { gameweek_rows } => {
                aggregate_gameweeks(&gameweek_rows, self.gameweek)?
            }
        };

        let mut seen = HashSet::with_capacity(records.len());
        if let Some(duplicate) = records.iter().find(|r| !seen.insert(r.id)) {
            return Err(InputError::DuplicatePlayer(duplicate.id));
        }
        if records.is_empty() {
            return Err(InputError::Empty);
        }
        Ok(records)
    }

    fn read_error(&self, reason: impl ToString) -> InputError {
        InputError::Snapshot {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl StatSource for JsonSnapshotSource {
    async fn load(&self) -> Result<Vec<PlayerRecord>, InputError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.read_error(e))?;
        let records = self.parse(&text)?;
        info!(
            path = %self.path.display(),
            players = records.len(),
            gameweek = ?self.gameweek,
            "Loaded player snapshot"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(element: u32, round: u32, points: f64, minutes: f64, now_cost: f64) -> GameweekRow {
        GameweekRow {
            element,
            name: format!("P{element}"),
            position: None,
            element_type: Some(3),
            team: "ARS".to_string(),
            now_cost: Some(now_cost),
            price: None,
            total_points: points,
            minutes,
            goals_scored: 0.0,
            assists: 0.0,
            round,
        }
    }

    #[test]
    fn test_aggregates_rounds_before_target() {
        let rows = vec![
            row(1, 1, 6.0, 90.0, 80.0),
            row(1, 2, 2.0, 90.0, 81.0),
            row(1, 3, 15.0, 90.0, 82.0),
        ];
        let records = aggregate_gameweeks(&rows, Some(3)).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.position, Position::Midfielder);
        assert!((record.price - 8.1).abs() < 1e-9);
        assert_eq!(record.stats["total_points"], 8.0);
        assert_eq!(record.stats["appearances"], 2.0);
        assert!((record.stats["pts_per_90"] - 4.0).abs() < 1e-9);
        assert_eq!(record.stats["expected_points"], record.stats["pts_per_90"]);
        assert!((record.stats["value_season"] - 8.0 / 8.1).abs() < 1e-9);
    }

    #[test]
    fn test_first_gameweek_uses_round_one() {
        let rows = vec![row(1, 1, 6.0, 0.0, 50.0), row(1, 2, 9.0, 90.0, 50.0)];
        let records = aggregate_gameweeks(&rows, Some(1)).unwrap();
        assert_eq!(records[0].stats["total_points"], 6.0);
        assert_eq!(records[0].stats["pts_per_90"], 0.0);
    }

    #[test]
    fn test_no_rounds_in_window_is_error() {
        let rows = vec![row(1, 5, 6.0, 90.0, 50.0)];
        assert_eq!(
            aggregate_gameweeks(&rows, Some(3)).unwrap_err(),
            InputError::NoRoundsBefore(3)
        );
    }

    #[test]
    fn test_parse_players_rejects_duplicates() {
        let source = JsonSnapshotSource::new("inline.json");
        let json = r#"{"players": [
            {"id": 1, "name": "A", "club": "X", "position": "GK", "price": 4.5},
            {"id": 1, "name": "B", "club": "Y", "position": "DEF", "price": 4.0}
        ]}"#;
        assert_eq!(source.parse(json).unwrap_err(), InputError::DuplicatePlayer(1));
    }

    #[test]
    fn test_parse_gameweek_rows_with_aliases() {
        let source = JsonSnapshotSource::new("inline.json").with_gameweek(Some(2));
        let json = r#"{"gameweek_rows": [
            {"element": 7, "web_name": "Saka", "position": "MID", "team_name": "ARS",
             "price": 10.0, "points": 12, "minutes": 90, "gw": 1},
            {"element": 8, "name": "Mystery", "team": "XXX", "price": 4.0,
             "total_points": 1, "minutes": 10, "round": 1}
        ]}"#;
        let records = source.parse(json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Saka");
        assert_eq!(records[0].club, "ARS");
        assert!((records[0].stats["value_season"] - 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_input_error() {
        let source = JsonSnapshotSource::new("/nonexistent/players.json");
        assert!(matches!(
            source.load().await.unwrap_err(),
            InputError::Snapshot { .. }
        ));
    }
}
