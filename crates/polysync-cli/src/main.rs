//! polysync CLI - Command-line interface for polysync
//!
//! Provides commands for:
//! - Ordering a change batch for safe sequential application
//! - Mirroring one local tree onto another
//! - Inspecting and validating the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use polysync_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{config::ConfigCommand, mirror::MirrorCommand, order::OrderCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "polysync", version, about = "Cross-provider file synchronization")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print a change batch in safe application order
    Order(OrderCommand),
    /// Copy a local directory tree onto another
    Mirror(MirrorCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Picks the log filter: `RUST_LOG` wins, then `-v`, then the config file
fn log_filter(verbose: u8, configured_level: &str) -> EnvFilter {
    let level = match verbose {
        0 => configured_level,
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    let env_filter = log_filter(cli.verbose, &config.logging.level);
    if cli.log_json || config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Order(cmd) => cmd.execute(format).await,
        Commands::Mirror(cmd) => cmd.execute(&config, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}
