//! Stat Source Port
//!
//! Supplies the player snapshot for one pipeline run.

use async_trait::async_trait;

use crate::domain::errors::InputError;
use crate::domain::models::player::PlayerRecord;

/// Provider of a player stat snapshot.
#[async_trait]
pub trait StatSource: Send + Sync {
    /// Load every player record for the run.
    ///
    /// Ids are unique within one snapshot. Records may lack some stats;
    /// the ranker tolerates that.
    async fn load(&self) -> Result<Vec<PlayerRecord>, InputError>;
}

/// An in-memory snapshot.
#[async_trait]
impl StatSource for Vec<PlayerRecord> {
    async fn load(&self) -> Result<Vec<PlayerRecord>, InputError> {
        Ok(self.clone())
    }
}
