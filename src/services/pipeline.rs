//! End-to-end squad selection run.
//!
//! StatSource -> Ranker -> expert panel -> consensus -> squad builder ->
//! result assembler. The panel is the only stage that suspends; everything
//! downstream of it runs after the join barrier.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::adapters::providers::ProviderMap;
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{Config, PipelineResponse, SharedPlayer};
use crate::domain::ports::{Credential, StatSource};

use super::consensus::ConsensusEngine;
use super::dispatcher::{Dispatcher, DispatcherConfig};
use super::expert_agent::ExpertPanel;
use super::ranker::{Ranker, Ranking};
use super::result_assembler::{ResultAssembler, RunMetadata};
use super::rotation::{RotationContext, RotationError};
use super::squad_builder::SquadBuilder;

/// One configured pipeline. Reusable across runs; rotation state is shared
/// between runs of the same instance.
pub struct SquadPipeline {
    ranker: Ranker,
    panel: ExpertPanel,
    consensus: ConsensusEngine,
    builder: SquadBuilder,
    assembler: ResultAssembler,
    dispatcher: Arc<Dispatcher>,
    budget: f64,
}

impl SquadPipeline {
    /// Wire every stage around an existing dispatcher.
    pub fn new(config: &Config, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            ranker: Ranker::new(config.ranking.clone(), config.squad.formation),
            panel: ExpertPanel::from_config(&config.panel, &dispatcher),
            consensus: ConsensusEngine::new(config.consensus.clone()),
            builder: SquadBuilder::from_config(&config.squad),
            assembler: ResultAssembler,
            dispatcher,
            budget: config.squad.budget,
        }
    }

    /// Build the rotation context and dispatcher from configuration.
    pub fn from_config(
        config: &Config,
        providers: ProviderMap,
        credentials: &[Credential],
    ) -> Result<Self, RotationError> {
        let rotation = RotationContext::new(
            &config.dispatch.fallback_chain,
            credentials,
            Duration::from_secs(config.dispatch.credential_cooldown_secs),
        )?;
        let dispatcher = Dispatcher::new(
            providers,
            Arc::new(rotation),
            DispatcherConfig::from_config(&config.dispatch),
        );
        Ok(Self::new(config, Arc::new(dispatcher)))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Load and rank only.
    pub async fn rank(&self, source: &dyn StatSource) -> PipelineResult<Ranking> {
        let players = load(source).await?;
        Ok(self.ranker.rank(&players)?)
    }

    /// Run every stage and return the assembled response.
    ///
    /// Cancellation abandons in-flight provider calls and ends the run with
    /// [`PipelineError::Cancelled`].
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        source: &dyn StatSource,
        cancel: &CancellationToken,
    ) -> PipelineResult<PipelineResponse> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let metadata = RunMetadata::new(self.budget);
        info!(run_id = %metadata.run_id, "Pipeline run started");

        let players = load(source).await?;
        let ranking = self.ranker.rank(&players)?;
        if ranking.is_degraded() {
            warn!(
                requested = ranking.requested,
                shortlisted = ranking.shortlist.len(),
                "Running with a degraded shortlist"
            );
        }

        let panel = self.panel.evaluate(&ranking.shortlist, cancel).await;
        if cancel.is_cancelled() {
            warn!(run_id = %metadata.run_id, "Pipeline run cancelled during evaluation");
            return Err(PipelineError::Cancelled);
        }

        let shortlist_ids: Vec<u32> = ranking.shortlist.iter().map(|c| c.id()).collect();
        let consensus = self.consensus.merge(&shortlist_ids, panel.results());
        let squad = self.builder.build(&ranking.shortlist, &ranking.pool, &consensus)?;

        let response = self
            .assembler
            .assemble(metadata, &squad, &ranking, &consensus, &panel);
        info!(
            run_id = %response.run_id,
            provenance = %response.provenance,
            total_price = response.total_price,
            consensus_candidates = response.coverage.consensus_candidates,
            "Pipeline run complete"
        );
        Ok(response)
    }
}

async fn load(source: &dyn StatSource) -> PipelineResult<Vec<SharedPlayer>> {
    let records = source.load().await?;
    Ok(records.into_iter().map(Arc::new).collect())
}
