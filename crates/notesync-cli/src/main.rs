//! notesync CLI - Command-line interface for the notesync engine
//!
//! Provides commands for:
//! - Running a sync, once or on an interval
//! - Viewing sync status
//! - Reviewing conflict copies
//! - Reporting items that cannot sync
//! - Managing configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, conflicts::ConflictsCommand, report::ReportCommand,
    status::StatusCommand, sync::SyncCommand, CommandContext,
};
use notesync_core::config::Config;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "notesync", version, about = "Note synchronization engine")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synchronize with the configured target
    Sync(SyncCommand),
    /// Show synchronization status
    Status(StatusCommand),
    /// Review conflict copies
    #[command(subcommand)]
    Conflicts(ConflictsCommand),
    /// List items that cannot sync
    Report(ReportCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Log level from the flags, falling back to the configured level
fn log_level(verbose: u8, quiet: bool, configured: &str) -> String {
    match (verbose, quiet) {
        (0, true) => "error".to_string(),
        (0, false) => configured.to_string(),
        (1, _) => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else if cli.quiet {
        OutputFormat::Quiet
    } else {
        OutputFormat::Human
    };
    let ctx = CommandContext::new(format, cli.config.as_deref());

    // Logging settings come from the file when it parses; a broken file is
    // reported by the command itself.
    let logging = Config::load(&ctx.config_path)
        .map(|c| c.logging)
        .unwrap_or_default();
    let filter = log_level(cli.verbose, cli.quiet, &logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if logging.format == "json" {
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

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Conflicts(cmd) => cmd.execute(&ctx).await,
        Commands::Report(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
