//! ScrapeGraph CLI: question answering over local data files.
//!
//! Classifies the source, builds a fetch → answer graph, and prints the
//! model's answer.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
