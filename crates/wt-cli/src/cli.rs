//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::import::ImportArgs;
use crate::commands::util::WindowArgs;

/// Playback session consolidation and concurrency analytics.
///
/// Ingests playback reports from media-server pollers and importers,
/// merges duplicates and fragments into canonical watch sessions, and
/// reports concurrent-stream peaks.
#[derive(Debug, Parser)]
#[command(name = "wt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show store status.
    Status,

    /// Import session reports (NDJSON) from stdin.
    Import(ImportArgs),

    /// Fold historical fragments into canonical sessions.
    Consolidate {
        /// Run even if consolidation already completed.
        #[arg(long)]
        force: bool,
    },

    /// Show peak and hourly concurrent streams.
    Concurrency {
        #[command(flatten)]
        window: WindowArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List canonical sessions.
    Sessions {
        #[command(flatten)]
        window: WindowArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
