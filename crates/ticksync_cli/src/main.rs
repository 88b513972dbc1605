//! ticksync CLI
//!
//! Command-line tools for ticksync facility stores.
//!
//! # Commands
//!
//! - `inspect` - Display sync facts and table statistics
//! - `changes` - Dump outgoing changes since a tick
//! - `changelog` - Dump changelog entries
//! - `sync` - Run one sync against an in-process central node

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ticksync command-line store tools.
#[derive(Parser)]
#[command(name = "ticksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display sync facts and table statistics
    Inspect,

    /// Dump outgoing changes captured since a tick
    Changes {
        /// Capture rows with a tick above this one (default: the push watermark)
        #[arg(short, long)]
        since: Option<i64>,

        /// JSON model manifest (default: every table, bidirectional)
        #[arg(short, long)]
        models: Option<PathBuf>,
    },

    /// Dump changelog entries
    Changelog {
        /// Only entries for this table
        #[arg(short, long)]
        table: Option<String>,

        /// Only entries for this record (requires --table)
        #[arg(short, long, requires = "table")]
        id: Option<String>,

        /// Only entries with a tick at or above this one
        #[arg(short, long)]
        since: Option<i64>,
    },

    /// Run one sync against an in-process central node
    Sync {
        /// JSON model manifest
        #[arg(short, long)]
        models: PathBuf,

        /// JSON array of change records to seed the central node with
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, cli.format)?;
        }
        Commands::Changes { since, models } => {
            let path = cli.path.ok_or("Store path required for changes")?;
            commands::changes::run(&path, since, models.as_deref(), cli.format)?;
        }
        Commands::Changelog { table, id, since } => {
            let path = cli.path.ok_or("Store path required for changelog")?;
            let filter = commands::changelog::ChangelogFilter { table, id, since };
            commands::changelog::run(&path, &filter, cli.format)?;
        }
        Commands::Sync { models, seed } => {
            let path = cli.path.ok_or("Store path required for sync")?;
            commands::sync::run(&path, &models, seed.as_deref(), cli.format)?;
        }
        Commands::Version => {
            println!("ticksync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ticksync protocol v{}", ticksync_protocol::PROTOCOL_VERSION);
        }
    }

    Ok(())
}
