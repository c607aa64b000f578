//! KidPlanner CLI: local kid-activity recommendations.
//!
//! Runs the discovery, safety and schedule stages in parallel for one
//! request, synthesizes a plan, and prints the structured response.

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
