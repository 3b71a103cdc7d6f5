//! Ghost CLI - inspect demos and race demo ghosts
//!
//! # Commands
//!
//! - `ghost info <demo>` - Print a demo's header, length and events
//! - `ghost recap <demo>...` - Set up ghosts and print the recap
//! - `ghost race <route.toml>` - Race ghosts against a scripted live route
//!
//! Settings are read from `config.toml` in the platform config directory,
//! or from `--config <path>`.

mod info;
mod race;
mod recap;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use demoghost_core::GhostConfig;

/// Ghost CLI - inspect demos and race demo ghosts
#[derive(Parser)]
#[command(name = "ghost")]
#[command(about = "Inspect demos and race demo ghosts")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a demo's header, length and events
    Info(info::InfoArgs),

    /// Set up ghosts from demos and print the recap
    Recap(recap::RecapArgs),

    /// Race ghosts against a scripted live route
    Race(race::RaceArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GhostConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => GhostConfig::load_or_default(),
    };

    match cli.command {
        Commands::Info(args) => info::execute(args, &config),
        Commands::Recap(args) => recap::execute(args, &config),
        Commands::Race(args) => race::execute(args, &config),
    }
}
