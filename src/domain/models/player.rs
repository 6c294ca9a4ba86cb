//! Player snapshot records supplied by a [`StatSource`](crate::domain::ports::StatSource).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stat key that resolves to [`PlayerRecord::price`] rather than the stats map.
pub const PRICE_CRITERION: &str = "price";

/// Playing position, serialized with the short codes used by fantasy data feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK", alias = "GKP")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

impl Position {
    /// All positions in squad display order.
    pub const ALL: [Self; 4] = [
        Self::Goalkeeper,
        Self::Defender,
        Self::Midfielder,
        Self::Forward,
    ];

    /// Short code (`GK`, `DEF`, `MID`, `FWD`).
    pub const fn code(self) -> &'static str {
        match self {
            Self::Goalkeeper => "GK",
            Self::Defender => "DEF",
            Self::Midfielder => "MID",
            Self::Forward => "FWD",
        }
    }

    /// Parse a short code, case-insensitive.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "GK" | "GKP" => Some(Self::Goalkeeper),
            "DEF" => Some(Self::Defender),
            "MID" => Some(Self::Midfielder),
            "FWD" => Some(Self::Forward),
            _ => None,
        }
    }

    /// Map the numeric `element_type` used by the official data feed.
    pub const fn from_element_type(element_type: u8) -> Option<Self> {
        match element_type {
            1 => Some(Self::Goalkeeper),
            2 => Some(Self::Defender),
            3 => Some(Self::Midfielder),
            4 => Some(Self::Forward),
            _ => None,
        }
    }

    /// Dense index, used for fixed-size per-position arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::Goalkeeper => 0,
            Self::Defender => 1,
            Self::Midfielder => 2,
            Self::Forward => 3,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Immutable snapshot of one player for a single pipeline run.
///
/// Records are wrapped in [`Arc`] once loaded and shared read-only by every
/// stage; nothing mutates them after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: u32,
    pub name: String,
    pub club: String,
    pub position: Position,
    /// Price in millions.
    pub price: f64,
    /// Historical stats keyed by name (`expected_points`, `minutes`, ...).
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
    #[serde(default = "default_available")]
    pub available: bool,
}

const fn default_available() -> bool {
    true
}

/// Shared handle to a player record.
pub type SharedPlayer = Arc<PlayerRecord>;

impl PlayerRecord {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        club: impl Into<String>,
        position: Position,
        price: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            club: club.into(),
            position,
            price,
            stats: BTreeMap::new(),
            available: true,
        }
    }

    /// Builder-style stat insertion.
    pub fn with_stat(mut self, key: impl Into<String>, value: f64) -> Self {
        self.stats.insert(key.into(), value);
        self
    }

    /// Builder-style availability flag.
    pub const fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Value of a ranking criterion; `None` when missing or not finite.
    pub fn criterion_value(&self, key: &str) -> Option<f64> {
        let value = if key == PRICE_CRITERION {
            Some(self.price)
        } else {
            self.stats.get(key).copied()
        };
        value.filter(|v| v.is_finite())
    }

    /// Returns true if every criterion key has a finite value.
    pub fn has_complete_criteria<'a>(&self, mut keys: impl Iterator<Item = &'a str>) -> bool {
        keys.all(|key| self.criterion_value(key).is_some())
    }
}
