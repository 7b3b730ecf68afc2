//! Sessions command for listing canonical watch sessions.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use wt_core::{TimeFilter, WatchSession};
use wt_db::Database;

use super::util::format_duration;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    filter: &TimeFilter,
    now: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    let sessions = db
        .list_sessions(filter, now)
        .context("failed to list sessions")?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&sessions).context("failed to encode sessions")?;
        writeln!(writer, "{rendered}")?;
        return Ok(());
    }

    if sessions.is_empty() {
        writeln!(writer, "No sessions in range.")?;
        return Ok(());
    }

    for session in &sessions {
        writeln!(writer, "{}", format_session(session))?;
    }
    Ok(())
}

fn format_session(session: &WatchSession) -> String {
    let title = match (&session.grandparent_title, &session.parent_title) {
        (Some(show), Some(season)) => format!("{show} - {season} - {}", session.title),
        (Some(show), None) => format!("{show} - {}", session.title),
        _ => session.title.clone(),
    };
    format!(
        "#{} {} {}  {}@{}  {}  {} played{}  [{}]",
        session.id,
        session.started_at.format("%Y-%m-%d %H:%M"),
        session.stopped_at.format("%H:%M"),
        session.user,
        session.server_id,
        title,
        format_duration(session.watched_ms),
        if session.watched { ", watched" } else { "" },
        session.decision,
    )
}
