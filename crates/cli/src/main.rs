//! # sortbin CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading, validation and scaffolding
//! - Pipeline orchestration and lifecycle management
//! - Graceful shutdown and camera restart on signals
//! - State queries against a running sorter

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_init, run_pipeline, run_query, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "sortbin starting");

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
        Commands::Init(args) => run_init(args),
        Commands::Query(args) => run_query(args).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    let config =
        ObservabilityConfig::for_verbosity(cli.verbose, cli.quiet).with_format(cli.log_format.into());
    observability::init_with_config(config)
}
