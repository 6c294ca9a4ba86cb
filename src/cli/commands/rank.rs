//! Implementation of the `pundit rank` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, RankedCandidate};
use crate::domain::ports::StatSource;
use crate::infrastructure::stat_source::JsonSnapshotSource;
use crate::services::Ranker;

#[derive(Args, Debug)]
pub struct RankArgs {
    /// Player snapshot file (JSON)
    #[arg(short, long)]
    pub players: PathBuf,

    /// Target gameweek; gameweek rows from earlier rounds are aggregated
    #[arg(short, long)]
    pub gameweek: Option<u32>,

    /// Shortlist size (default: ranking.shortlist_size)
    #[arg(short, long)]
    pub top: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RankOutput {
    pub requested: usize,
    pub excluded: usize,
    pub degraded: bool,
    pub shortlist: Vec<RankedCandidate>,
}

impl CommandOutput for RankOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![TableFormatter::new().format_shortlist(&self.shortlist)];
        lines.push(format!(
            "{} of {} requested candidates, {} players excluded for missing data",
            self.shortlist.len(),
            self.requested,
            self.excluded
        ));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RankArgs, mut config: Config, json_mode: bool) -> Result<()> {
    if let Some(top) = args.top {
        config.ranking.shortlist_size = top;
    }

    let source = JsonSnapshotSource::new(&args.players).with_gameweek(args.gameweek);
    let players: Vec<_> = source
        .load()
        .await
        .context("Failed to load player snapshot")?
        .into_iter()
        .map(Arc::new)
        .collect();

    let ranking = Ranker::new(config.ranking, config.squad.formation)
        .rank(&players)
        .context("Ranking failed")?;

    let result = RankOutput {
        requested: ranking.requested,
        excluded: ranking.excluded,
        degraded: ranking.is_degraded(),
        shortlist: ranking.shortlist,
    };
    output(&result, json_mode);
    Ok(())
}
