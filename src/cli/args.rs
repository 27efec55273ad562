//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Box - scriptable container image builder
///
/// Runs a Lua build script step by step against Podman or Docker, caching
/// the image produced by every step.
#[derive(Parser, Debug)]
#[command(name = "box")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BOXER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an image from a script
    Build(BuildArgs),

    /// Inspect or clear the step cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Build script (reads stdin when omitted or `-`)
    pub script: Option<PathBuf>,

    /// Execute every step, ignoring cached results
    #[arg(
        long,
        env = "NO_CACHE",
        action = ArgAction::Set,
        value_parser = parse_boolish,
        num_args = 0..=1,
        default_missing_value = "true",
        default_value = "false"
    )]
    pub no_cache: bool,

    /// Deadline for each in-container command, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Cache file to use instead of the configured one
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Write the final image id and config as JSON
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Append a JSON line per step to this file
    #[arg(long, value_name = "PATH")]
    pub journal: Option<PathBuf>,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,

    /// Cache file to operate on instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    pub cache: Option<PathBuf>,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached steps
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove every cache entry
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the cache file path
    Path,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Image ids only, one per line
    Plain,
}

/// Accept the usual spellings of a boolean environment flag
fn parse_boolish(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}
