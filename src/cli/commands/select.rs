//! Implementation of the `pundit select` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::adapters::providers::ProviderRegistry;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, PipelineResponse};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::credentials::resolve_credentials;
use crate::infrastructure::stat_source::JsonSnapshotSource;
use crate::services::SquadPipeline;

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Player snapshot file (JSON)
    #[arg(short, long)]
    pub players: PathBuf,

    /// Target gameweek; gameweek rows from earlier rounds are aggregated
    #[arg(short, long)]
    pub gameweek: Option<u32>,

    /// Override the budget ceiling (millions)
    #[arg(short, long)]
    pub budget: Option<f64>,

    /// Use the offline synthetic panel instead of remote providers
    #[arg(long)]
    pub mock: bool,
}

#[derive(Debug, Serialize)]
pub struct SelectOutput {
    #[serde(flatten)]
    pub response: PipelineResponse,
}

impl CommandOutput for SelectOutput {
    fn to_human(&self) -> String {
        TableFormatter::new().format_squad(&self.response)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.response).unwrap_or_default()
    }
}

pub async fn execute(args: SelectArgs, mut config: Config, json_mode: bool) -> Result<()> {
    if let Some(budget) = args.budget {
        config.squad.budget = budget;
        ConfigLoader::validate(&config)?;
    }
    if args.mock {
        config.dispatch = ProviderRegistry::offline_config(&config.dispatch);
    }

    let providers = ProviderRegistry::build(&config.dispatch)?;
    let credentials = resolve_credentials(&config.dispatch.credentials);
    let pipeline = SquadPipeline::from_config(&config, providers, &credentials)
        .context("No usable provider route; export the configured API key variables or pass --mock")?;
    let source = JsonSnapshotSource::new(&args.players).with_gameweek(args.gameweek);

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let result = pipeline.run(&source, &cancel).await;
    interrupt.abort();

    let response = result.context("Squad selection failed")?;
    output(&SelectOutput { response }, json_mode);
    Ok(())
}
