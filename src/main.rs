//! Pundit CLI entry point.

use clap::Parser;

use pundit::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = pundit::cli::run(cli).await {
        pundit::cli::handle_error(err, json);
    }
}
