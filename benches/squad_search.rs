use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pundit::domain::models::{
    ConsensusConfig, EvaluationResult, Formation, OutcomeDistribution, PlayerRecord, Position,
    RankingConfig, SharedPlayer, SquadConstraints,
};
use pundit::services::{ConsensusEngine, Ranker, SquadBuilder};
use std::sync::Arc;

const NODE_LIMIT: u64 = 2_000_000;

fn players(count: u32) -> Vec<SharedPlayer> {
    (1..=count)
        .map(|id| {
            let position = Position::ALL[(id % 4) as usize];
            let price = 4.0 + f64::from(id % 9) * 0.75;
            let form = 1.0 + f64::from((id * 37) % 29) / 4.0;
            Arc::new(
                PlayerRecord::new(id, format!("Player {id}"), format!("C{:02}", id % 20), position, price)
                    .with_stat("expected_points", form)
                    .with_stat("value_season", form * 10.0 / price)
                    .with_stat("pts_per_90", form * 0.8),
            )
        })
        .collect()
}

fn benchmark_ranker(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranker");

    for size in [100u32, 600] {
        let pool = players(size);
        let ranker = Ranker::new(RankingConfig::default(), Formation::default());
        group.bench_with_input(BenchmarkId::from_parameter(size), &pool, |b, pool| {
            b.iter(|| black_box(ranker.rank(pool)));
        });
    }

    group.finish();
}

fn benchmark_squad_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("squad_search");
    let builder = SquadBuilder::new(SquadConstraints::default(), NODE_LIMIT);

    for size in [100u32, 600] {
        let ranking = match Ranker::new(RankingConfig::default(), Formation::default())
            .rank(&players(size))
        {
            Ok(ranking) => ranking,
            Err(e) => panic!("ranking failed: {e}"),
        };

        let ids: Vec<u32> = ranking.shortlist.iter().map(|c| c.id()).collect();
        let results: Vec<EvaluationResult> = ranking
            .shortlist
            .iter()
            .map(|c| {
                let s = c.score.clamp(0.0, 1.0);
                let haulers = 0.1 + 0.3 * s;
                let distribution = OutcomeDistribution::new(0.2 - 0.1 * s, 0.3, 0.4 - 0.2 * s, haulers)
                    .normalized()
                    .unwrap_or(OutcomeDistribution::NEUTRAL);
                EvaluationResult::valid(c.id(), "safe_bet", distribution, "")
            })
            .collect();
        let consensus = ConsensusEngine::new(ConsensusConfig::default()).merge(&ids, &results);

        group.bench_with_input(BenchmarkId::new("primary", size), &ranking, |b, ranking| {
            b.iter(|| black_box(builder.build_primary(&ranking.shortlist, &consensus)));
        });
        group.bench_with_input(BenchmarkId::new("fallback", size), &ranking, |b, ranking| {
            b.iter(|| black_box(builder.build_fallback(&ranking.pool)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_ranker, benchmark_squad_search);
criterion_main!(benches);
