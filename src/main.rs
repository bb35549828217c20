use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;
mod events;
mod ingest;
mod learning;
mod report;
mod snapshot;
mod storage;

/// vocablog - flashcard review history from score database snapshots
///
/// Reconstructs individual reviews from periodic captures of a flashcard
/// database and tracks which words are learned or forgotten over time.
#[derive(Parser)]
#[command(name = "vocablog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reconstruct flashcard review history from score database snapshots", long_about = None)]
struct Cli {
    /// Data directory (default: ./.vocablog if present, else ~/.vocablog)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, default config and state database
    Init,

    /// Process snapshots captured since the last run
    Ingest {
        /// Process at most this many snapshots
        #[arg(long)]
        limit: Option<usize>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear all state and ingest every snapshot from scratch
    Rebuild {
        #[arg(long)]
        json: bool,
    },

    /// Show processed and pending snapshots
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Per-date review and learning counts
    Daily {
        /// First date included (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// First date excluded (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Also write the rows to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Per-word report for a window (default: the last `window_days` days)
    Words {
        /// First date included (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// First date excluded (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Also write the rows to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Trace every review of a headword with its learning state
    History {
        headword: String,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // stdout is reserved for reports
        .init();

    let home = commands::resolve_home(cli.home)?;

    match cli.command {
        Commands::Init => {
            info!("Initializing {:?}", home);
            commands::init(&home)?;
        }
        Commands::Ingest { limit, json } => {
            let running = install_interrupt_handler()?;
            commands::ingest(&home, limit, &running, json)?;
        }
        Commands::Rebuild { json } => {
            let running = install_interrupt_handler()?;
            commands::rebuild(&home, &running, json)?;
        }
        Commands::Status { json } => {
            commands::status(&home, json)?;
        }
        Commands::Daily { start, end, csv, json } => {
            commands::daily(&home, start, end, csv, json)?;
        }
        Commands::Words { start, end, csv, json } => {
            commands::words(&home, start, end, csv, json)?;
        }
        Commands::History { headword, json } => {
            commands::history(&home, &headword, json)?;
        }
    }

    Ok(())
}

/// Ctrl-C stops an ingest run between snapshots
fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, finishing the current snapshot");
        r.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}
