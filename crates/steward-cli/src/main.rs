// CLI for operators: config checks and offline filter runs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "steward")]
#[command(about = "Steward - node-local convergence agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate and print the effective agent configuration
    CheckConfig {
        /// TOML config file; defaults and STEWARD_* variables apply without it
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the usage filter over a JSON snapshot and print surviving dataset ids
    FilterDatasets {
        /// Snapshot with node_uuid, applications, leases and candidates
        #[arg(short, long)]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    steward_agent::init_tracing(log_level);

    match cli.command {
        Commands::CheckConfig { config } => {
            commands::config::check_config(config.as_deref())?;
        }
        Commands::FilterDatasets { snapshot } => {
            commands::filter::filter_datasets(&snapshot)?;
        }
    }

    Ok(())
}
