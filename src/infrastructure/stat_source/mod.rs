//! Player snapshot sources

pub mod snapshot;

pub use snapshot::{aggregate_gameweeks, GameweekRow, JsonSnapshotSource};
