//! Packages a finished squad for the caller. No decisions are made here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::{
    ConsensusReport, Coverage, PersonaSummary, PipelineResponse, SelectedPlayer, Squad, SquadSlot,
};

use super::expert_agent::PanelReport;
use super::ranker::Ranking;

/// Run identity stamped on the response.
#[derive(Debug, Clone, Copy)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub budget: f64,
}

impl RunMetadata {
    pub fn new(budget: f64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            budget,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(
        &self,
        metadata: RunMetadata,
        squad: &Squad,
        ranking: &Ranking,
        consensus: &ConsensusReport,
        panel: &PanelReport,
    ) -> PipelineResponse {
        let ranker_scores: HashMap<u32, f64> = ranking
            .pool
            .iter()
            .chain(&ranking.shortlist)
            .map(|c| (c.id(), c.score))
            .collect();

        let players = squad
            .slots
            .iter()
            .map(|slot| selected_player(slot, &ranker_scores, consensus))
            .collect();

        let valid_results = panel.results().filter(|r| r.is_valid()).count();
        let coverage = Coverage {
            shortlisted: ranking.shortlist.len(),
            requests: panel.requests(),
            failed_requests: panel.failed_requests(),
            valid_results,
            invalid_results: panel.results().count() - valid_results,
            consensus_candidates: consensus.len(),
        };

        let personas = panel
            .personas
            .iter()
            .map(|p| PersonaSummary {
                persona: p.persona.clone(),
                valid: p.valid_count(),
                invalid: p.invalid_count(),
            })
            .collect();

        let total_price = squad.total_price();
        PipelineResponse {
            run_id: metadata.run_id,
            generated_at: metadata.generated_at,
            provenance: squad.provenance,
            fallback_reason: squad.fallback_reason.clone(),
            budget: metadata.budget,
            total_price,
            remaining_budget: metadata.budget - total_price,
            total_score: squad.total_value(),
            players,
            coverage,
            personas,
        }
    }
}

fn selected_player(
    slot: &SquadSlot,
    ranker_scores: &HashMap<u32, f64>,
    consensus: &ConsensusReport,
) -> SelectedPlayer {
    let player = &slot.player;
    let ranker_score = ranker_scores.get(&player.id).copied().unwrap_or(0.0);
    let score = consensus.get(player.id);
    let justification = score.map_or_else(
        || format!("Selected on ranker score {ranker_score:.3}"),
        |s| s.justification.clone(),
    );

    SelectedPlayer {
        id: player.id,
        name: player.name.clone(),
        club: player.club.clone(),
        position: player.position,
        price: player.price,
        ranker_score,
        consensus_score: score.map(|s| s.merged_score),
        agreement: score.map(|s| s.agreement),
        high_disagreement: score.is_some_and(|s| s.high_disagreement),
        strong_pick: score.is_some_and(|s| s.strong_pick),
        value: slot.value,
        score_source: slot.source,
        justification,
    }
}
