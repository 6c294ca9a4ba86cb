//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::config::ConfigCommands;
use super::commands::rank::RankArgs;
use super::commands::select::SelectArgs;

#[derive(Parser)]
#[command(name = "pundit")]
#[command(about = "Pundit - fantasy squad selection pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (default: pundit.yaml and pundit.local.yaml in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline and print the selected squad
    Select(SelectArgs),

    /// Print the ranked shortlist without consulting the panel
    Rank(RankArgs),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_select_with_globals() {
        let cli = Cli::parse_from([
            "pundit", "select", "--players", "players.json", "--gameweek", "5", "--mock", "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Select(args) => {
                assert_eq!(args.players, PathBuf::from("players.json"));
                assert_eq!(args.gameweek, Some(5));
                assert!(args.mock);
                assert!(args.budget.is_none());
            }
            _ => panic!("expected select"),
        }
    }
}
