//! kss-styleguide CLI: build a living style guide from KSS comments.
//!
//! Reads CSS/Sass/Less sources, parses their KSS documentation, and writes
//! one output set per root section plus an index.

mod commands;
mod output;

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
