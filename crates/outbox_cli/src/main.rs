//! Outbox CLI
//!
//! Command-line tools for a file-backed outbox queue.
//!
//! # Commands
//!
//! - `pending` - Print the number of queued operations
//! - `dump` - List queued operations for debugging
//! - `clear` - Discard every queued operation

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::CliError;
use outbox_engine::DEFAULT_PARTITION;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Outbox queue maintenance tools.
#[derive(Parser)]
#[command(name = "outbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Partition holding the operation log
    #[arg(global = true, long, default_value = DEFAULT_PARTITION)]
    partition: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the number of queued operations
    Pending,

    /// List queued operations in replay order
    Dump {
        /// Maximum number of operations to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Discard every queued operation
    Clear {
        /// Confirm discarding a non-empty queue
        #[arg(short, long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

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
        Commands::Pending => {
            let path = cli.path.ok_or(CliError::MissingPath("pending"))?;
            let count = commands::pending::run(&path, &cli.partition)?;
            println!("{}", count);
        }
        Commands::Dump { limit, format } => {
            let path = cli.path.ok_or(CliError::MissingPath("dump"))?;
            let listing = commands::dump::run(&path, &cli.partition, limit)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listing)?),
                OutputFormat::Text => commands::dump::print_text(&listing),
            }
        }
        Commands::Clear { yes } => {
            let path = cli.path.ok_or(CliError::MissingPath("clear"))?;
            let cleared = commands::clear::run(&path, &cli.partition, yes)?;
            println!("Cleared {} pending operation(s)", cleared);
        }
        Commands::Version => {
            println!("Outbox CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
