//! ESPM CLI: build a semantic path knowledge base and tag texts with it.
//!
//! Builds the category taxonomy and ESA snapshot from dump-derived JSON-lines
//! files, then mines diverse weighted taxonomy paths for input texts.

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
