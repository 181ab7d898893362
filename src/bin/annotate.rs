//! Maintainer annotator
//!
//! Filter reading lines from standard input; lines whose first
//! identifier-shaped token names a managed package get the maintainers'
//! handles appended. Everything else passes through unchanged.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pkgcycle::config::Config;
use pkgcycle::core::annotate::Annotator;
use pkgcycle::core::recipe;

/// Annotate package mentions with their maintainers' handles
#[derive(Parser, Debug)]
#[command(name = "pkgcycle-annotate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Use a specific config file instead of the search path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Recipes that fail to load simply go unannotated here.
    let (recipes, _errors) = recipe::load_recipes(&config.repo_dir());
    let annotator = Annotator::new(&recipes);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read standard input")?;
        writeln!(out, "{}", annotator.annotate_line(&line))
            .context("Failed to write standard output")?;
    }
    Ok(())
}
