//! Livedata Control - CLI client for livedatad

use anyhow::Result;
use clap::Parser;
use livedatactl::cli::Cli;
use livedatactl::commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    commands::dispatch(cli.command, cli.url.as_deref(), cli.json).await
}
