//! Pkgcycle - automated build orchestrator for a community package repository
//!
//! Entry point for the pkgcycle command-line application.

use anyhow::Result;
use clap::Parser;

use pkgcycle::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run().await
}
