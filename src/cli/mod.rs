//! Command-line interface
//!
//! Argument parsing and dispatch for the packforge binary.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::error::Result;

/// Dependency-ordered parallel rebuilder for interdependent source
/// packages.
#[derive(Debug, Parser)]
#[command(name = "packforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the batch in dependency order
    Build(commands::build::BuildArgs),
    /// Print the computed build order and its explanations
    Order(commands::order::OrderArgs),
    /// Check that the configured external commands exist
    Doctor(commands::doctor::DoctorArgs),
}

impl Cli {
    /// Run the selected command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Build(args) => commands::build::run(args).await,
            Commands::Order(args) => commands::order::run(args).await,
            Commands::Doctor(args) => commands::doctor::run(args),
        }
    }
}
