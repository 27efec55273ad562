//! Box - scriptable container image builder
//!
//! CLI entry point that dispatches to subcommands.

use boxer::cli::{Cli, Commands};
use boxer::config::ConfigManager;
use boxer::error::BoxerResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BoxerResult<()> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info (step records and container output), 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("boxer=warn"),
        1 => EnvFilter::new("boxer=info"),
        _ => EnvFilter::new("boxer=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;
    debug!("Loaded config from {}", config_manager.path().display());

    match cli.command {
        Commands::Build(args) => boxer::cli::commands::build(args, &config).await,
        Commands::Cache(args) => boxer::cli::commands::cache(args, &config).await,
        Commands::Config(args) => boxer::cli::commands::config(args, &config, &config_manager).await,
    }
}
