//! dbgobj - Debugger Object Model
//!
//! Replays scripted debug-engine sessions against the object manager and
//! reports the objects, breakpoints and notifications they leave behind.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dbgobj_common::{logging, Config};
use eyre::Result;

mod cmd;
mod report;
mod scenario;

/// Command-line interface for dbgobj
#[derive(Debug, Parser)]
#[command(name = "dbgobj")]
#[command(about = "Debugger Object Model - replays scripted debug-engine sessions")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ~/.dbgobj.toml)
    #[arg(long, env = "DBGOBJ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay a scenario file and print the resulting object state
    Simulate {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config {
        /// Only print the configuration file path
        #[arg(long)]
        path: bool,
    },
}

// The dispatcher blocks its callers, so main stays off any async runtime.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    logging::init_logging("dbgobj", &config.logging.level, config.logging.file_logging)?;

    match cli.command {
        Commands::Simulate { scenario, json } => {
            tracing::info!("Simulating scenario: {}", scenario.display());
            cmd::simulate(&scenario, &config, json)
        }
        Commands::Config { path } => cmd::show_config(&config, cli.config, path),
    }
}
