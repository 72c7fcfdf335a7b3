//! ToolHarvest CLI: crawl an AI-tool listing and enrich every entry.
//!
//! Each listed tool is captured in a headless browser, summarized and
//! categorized by a language model, and upserted into a local libSQL store.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
