//! End-to-end pipeline runs against the mock provider.

mod common;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use pundit::adapters::providers::{MockProvider, MockResponse};
use pundit::domain::models::{PlayerRecord, Position, Provenance, SquadConstraints};
use pundit::domain::ports::ProviderError;
use pundit::{PipelineResponse, SquadPipeline};
use tokio_util::sync::CancellationToken;

fn pipeline(provider: &Arc<MockProvider>, credential_ids: &[&str]) -> SquadPipeline {
    SquadPipeline::from_config(
        &common::config(credential_ids),
        common::providers(provider),
        &common::credentials(credential_ids),
    )
    .unwrap()
}

fn assert_legal(response: &PipelineResponse) {
    let constraints = SquadConstraints::default();
    assert_eq!(response.players.len(), 15);
    assert!(response.total_price <= constraints.budget + 1e-9);

    let ids: HashSet<u32> = response.players.iter().map(|p| p.id).collect();
    assert_eq!(ids.len(), 15);

    for position in Position::ALL {
        let count = response.players.iter().filter(|p| p.position == position).count();
        assert_eq!(count, constraints.formation.required(position), "{position}");
    }

    let mut clubs: BTreeMap<&str, usize> = BTreeMap::new();
    for p in &response.players {
        *clubs.entry(p.club.as_str()).or_default() += 1;
    }
    assert!(clubs.values().all(|count| *count <= constraints.max_per_club));
}

#[tokio::test]
async fn test_forty_candidates_one_chunk_per_persona() {
    common::setup_test_logging();
    let provider = Arc::new(MockProvider::new(common::MOCK));
    let players = common::snapshot([5, 13, 13, 9]);

    let response = pipeline(&provider, &["k1"])
        .run(&players, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.coverage.shortlisted, 30);
    assert_eq!(response.coverage.requests, 3);
    assert_eq!(response.coverage.failed_requests, 0);
    assert_eq!(response.coverage.valid_results, 90);

    let calls = provider.calls().await;
    assert_eq!(calls.len(), 3);
    let tags: HashSet<&str> = calls.iter().map(|c| c.tag.as_str()).collect();
    assert_eq!(tags.len(), 3);

    assert_eq!(response.provenance, Provenance::ConsensusBuilt);
    assert_legal(&response);
}

#[tokio::test(start_paused = true)]
async fn test_persona_calls_share_the_concurrency_ceiling() {
    let provider = Arc::new(MockProvider::new(common::MOCK).with_delay(Duration::from_millis(500)));
    let mut config = common::config(&["k1"]);
    config.dispatch.max_concurrency = 2;
    let pipeline = SquadPipeline::from_config(
        &config,
        common::providers(&provider),
        &common::credentials(&["k1"]),
    )
    .unwrap();

    let response = pipeline
        .run(&common::snapshot([5, 13, 13, 9]), &CancellationToken::new())
        .await
        .unwrap();

    // Three persona calls, two admitted at a time.
    assert_eq!(provider.call_count().await, 3);
    assert_eq!(provider.max_in_flight(), 2);
    assert_eq!(response.coverage.failed_requests, 0);
    assert_eq!(response.provenance, Provenance::ConsensusBuilt);
    assert_legal(&response);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_persona_still_builds_from_consensus() {
    let provider = Arc::new(MockProvider::new(common::MOCK));
    provider
        .set_response_for_tag(
            "differentials_specialist",
            MockResponse::failure(ProviderError::RateLimited("quota".to_string())),
        )
        .await;
    let players = common::snapshot([5, 13, 13, 9]);

    let response = pipeline(&provider, &["k1", "k2"])
        .run(&players, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::ConsensusBuilt);
    assert_eq!(response.coverage.failed_requests, 1);
    assert_eq!(response.coverage.consensus_candidates, 30);

    let differentials = response
        .personas
        .iter()
        .find(|p| p.persona == "differentials_specialist")
        .unwrap();
    assert_eq!(differentials.valid, 0);
    assert_eq!(differentials.invalid, 30);

    // Three attempts on each of the two credentials.
    let failed_calls = provider
        .calls()
        .await
        .into_iter()
        .filter(|c| c.tag == "differentials_specialist")
        .count();
    assert_eq!(failed_calls, 6);
    assert_legal(&response);
}

#[tokio::test]
async fn test_all_calls_failing_yields_fallback_squad() {
    let provider = Arc::new(MockProvider::with_default_response(
        common::MOCK,
        MockResponse::failure(ProviderError::Auth("revoked".to_string())),
    ));
    let players = common::snapshot([5, 13, 13, 9]);

    let response = pipeline(&provider, &["k1", "k2"])
        .run(&players, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::FallbackBuilt);
    assert!(response.fallback_reason.is_some());
    assert_eq!(response.coverage.valid_results, 0);
    assert_eq!(response.coverage.consensus_candidates, 0);
    assert!(response.players.iter().all(|p| p.consensus_score.is_none()));
    assert_legal(&response);
}

#[tokio::test]
async fn test_club_cap_holds_with_four_top_players_from_one_club() {
    let provider = Arc::new(MockProvider::new(common::MOCK));
    let mut players = common::snapshot([5, 13, 13, 9]);
    // Four cheap stand-out midfielders from the same club.
    for id in 100..104 {
        players.push(common::player(id, "ARS", Position::Midfielder, 5.0, 20.0 - f64::from(id - 100)));
    }

    let response = pipeline(&provider, &["k1"])
        .run(&players, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::ConsensusBuilt);
    let ars: Vec<u32> = response
        .players
        .iter()
        .filter(|p| p.club == "ARS")
        .map(|p| p.id)
        .collect();
    assert_eq!(ars.len(), 3);
    assert!(!ars.contains(&103));
    assert_legal(&response);
}

#[tokio::test]
async fn test_degraded_snapshot_shrinks_shortlist() {
    let provider = Arc::new(MockProvider::new(common::MOCK));
    let mut players = common::snapshot([3, 7, 7, 5]);
    // Missing a criterion: excluded from ranking.
    players.push(PlayerRecord::new(500, "No Stats", "C99", Position::Forward, 4.5));

    let response = pipeline(&provider, &["k1"])
        .run(&players, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.coverage.shortlisted, 22);
    assert!(response.players.iter().all(|p| p.id != 500));
    assert_legal(&response);
}

#[tokio::test]
async fn test_rank_is_deterministic() {
    let provider = Arc::new(MockProvider::new(common::MOCK));
    let pipeline = pipeline(&provider, &["k1"]);
    let players = common::snapshot([5, 13, 13, 9]);
    let mut reversed = players.clone();
    reversed.reverse();

    let first = pipeline.rank(&players).await.unwrap();
    let second = pipeline.rank(&reversed).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first.shortlist).unwrap(),
        serde_json::to_string(&second.shortlist).unwrap()
    );
    assert_eq!(provider.call_count().await, 0);
}
