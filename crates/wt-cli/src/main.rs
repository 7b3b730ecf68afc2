use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wt_cli::commands::{concurrency, consolidate, import, sessions, status};
use wt_cli::{Cli, Commands, Config};
use wt_core::CancellationToken;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(wt_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let consolidation = config
        .consolidation
        .to_config()
        .context("invalid consolidation settings")?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = wt_db::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?
        .with_config(consolidation);
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut out, &db, &config)?;
        }
        Some(Commands::Import(args)) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            let stdin = io::stdin();
            import::run(
                stdin.lock(),
                &mut out,
                &mut db,
                args,
                &CancellationToken::new(),
            )?;
        }
        Some(Commands::Consolidate { force }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            consolidate::run(&mut out, &mut db, *force)?;
        }
        Some(Commands::Concurrency { window, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            let now = Utc::now();
            let filter = window.to_filter(now)?;
            concurrency::run(&mut out, &db, &filter, now, *json)?;
        }
        Some(Commands::Sessions { window, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            let now = Utc::now();
            let filter = window.to_filter(now)?;
            sessions::run(&mut out, &db, &filter, now, *json)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
