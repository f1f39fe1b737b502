//! PushSync CLI
//!
//! Command-line tools for PushSync message stores.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics and the next sync request
//! - `receive` - Record incoming messages as pending delivery reports
//! - `sync` - Run one sync cycle against a canned server response

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PushSync command-line tools.
#[derive(Parser)]
#[command(name = "pushsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON message store
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics and the ids the next sync would report
    Inspect {
        /// Archive retention window in days
        #[arg(short, long, default_value = "7")]
        retention_days: i64,

        /// Maximum number of archive ids
        #[arg(short = 'l', long, default_value = "100")]
        fetch_limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Record incoming messages so their delivery gets reported
    Receive {
        /// Message ids
        #[arg(required = true)]
        message_ids: Vec<String>,
    },

    /// Run one sync cycle against a canned server response
    Sync {
        /// Installation id to sync as
        #[arg(short, long)]
        internal_id: String,

        /// File holding the sync response body; an empty response if absent
        #[arg(short, long)]
        response: Option<PathBuf>,
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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect {
            retention_days,
            fetch_limit,
            format,
        } => {
            let path = cli.store.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, retention_days, fetch_limit, &format)?;
        }
        Commands::Receive { message_ids } => {
            let path = cli.store.ok_or("Store path required for receive")?;
            commands::receive::run(&path, &message_ids)?;
        }
        Commands::Sync {
            internal_id,
            response,
        } => {
            let path = cli.store.ok_or("Store path required for sync")?;
            commands::sync::run(&path, &internal_id, response.as_deref())?;
        }
        Commands::Version => {
            println!("PushSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
