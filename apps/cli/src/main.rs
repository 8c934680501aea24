//! ArticleFix CLI: detect and repair defects in localized teaching articles.
//!
//! Finds broken vocabulary components and cut-off prose, asks a generative
//! model for replacements, and writes back only candidates that pass
//! validation.

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
