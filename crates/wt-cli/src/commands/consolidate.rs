//! Consolidate command for folding historical fragments.

use std::io::Write;

use anyhow::{Context, Result};

use wt_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &mut Database, force: bool) -> Result<()> {
    let stats = db
        .consolidate_history(force)
        .context("failed to consolidate session history")?;

    if stats.already_complete {
        writeln!(
            writer,
            "History already consolidated. Use --force to run again."
        )?;
        return Ok(());
    }

    writeln!(
        writer,
        "Scanned {} group(s): folded {} chain(s), absorbed {} row(s).",
        stats.groups_scanned, stats.chains_folded, stats.rows_absorbed
    )?;
    Ok(())
}
