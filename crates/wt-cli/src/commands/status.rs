//! Status command for showing store contents.

use std::io::Write;

use anyhow::Result;

use wt_db::Database;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, db: &Database, config: &Config) -> Result<()> {
    let count = db.session_count()?;
    let consolidated = db.history_consolidated()?;
    let settings = db.config();

    writeln!(writer, "Watch session store")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Sessions: {count}")?;
    writeln!(
        writer,
        "History consolidated: {}",
        if consolidated { "yes" } else { "no" }
    )?;
    writeln!(
        writer,
        "Dedup window: {}s",
        settings.dedup_window.num_seconds()
    )?;
    writeln!(
        writer,
        "Consolidation window: {}m",
        settings.consolidation_window.num_minutes()
    )?;
    writeln!(
        writer,
        "Watched threshold: {:.0}%",
        settings.watched_threshold * 100.0
    )?;
    Ok(())
}
