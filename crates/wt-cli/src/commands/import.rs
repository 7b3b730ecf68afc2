//! Import command for ingesting session reports into the local `SQLite` store.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Deserialize;

use wt_core::{CancellationToken, Decision, Enrichment, SessionReport, is_storable};
use wt_db::Database;

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Default server id to apply when incoming reports omit `server_id`.
    #[arg(long)]
    pub server: Option<String>,

    /// Store reports as-is without deduplication (legacy history).
    ///
    /// Run `wt consolidate` afterwards to fold the fragments.
    #[arg(long)]
    pub raw: bool,
}

pub fn run<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    db: &mut Database,
    args: &ImportArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let reports = parse_reports(reader, args.server.as_deref())?;
    tracing::debug!(reports = reports.len(), raw = args.raw, "parsed session reports");

    if args.raw {
        let appended = db
            .append_sessions(&reports)
            .context("failed to append session history")?;
        writeln!(writer, "Appended {appended} raw session(s).")?;
        return Ok(());
    }

    let stats = db
        .insert_sessions(&reports, cancel)
        .context("failed to import session reports")?;
    writeln!(
        writer,
        "Imported {} report(s): {} new, {} skipped, {} merged, {} rejected.",
        reports.len(),
        stats.inserted,
        stats.skipped,
        stats.merged,
        stats.rejected
    )?;
    Ok(())
}

fn parse_reports<R: BufRead>(
    reader: R,
    default_server: Option<&str>,
) -> Result<Vec<SessionReport>> {
    let mut reports = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: ImportReport = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        let report = parsed
            .into_report(default_server)
            .with_context(|| format!("invalid report on line {}", idx + 1))?;
        reports.push(report);
    }
    Ok(reports)
}

/// Timestamps arrive either as RFC 3339 strings or as Unix seconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimestampInput {
    Epoch(i64),
    Text(String),
}

impl TimestampInput {
    fn resolve(&self, field: &str) -> Result<DateTime<Utc>> {
        let resolved = match self {
            Self::Epoch(secs) => DateTime::from_timestamp(*secs, 0)
                .ok_or_else(|| anyhow::anyhow!("{field} out of range: {secs}"))?,
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|parsed| parsed.with_timezone(&Utc))
                .with_context(|| format!("invalid {field}: {text}"))?,
        };
        if !is_storable(resolved) {
            anyhow::bail!("{field} out of range: {resolved} (epoch milliseconds instead of seconds?)");
        }
        Ok(resolved)
    }
}

#[derive(Debug, Deserialize)]
struct ImportReport {
    #[serde(default)]
    server_id: Option<String>,
    user: String,
    title: String,
    #[serde(default)]
    parent_title: Option<String>,
    #[serde(default)]
    grandparent_title: Option<String>,
    #[serde(default = "default_media_type")]
    media_type: String,
    started_at: TimestampInput,
    stopped_at: TimestampInput,
    #[serde(default)]
    watched_ms: i64,
    #[serde(default)]
    paused_ms: i64,
    #[serde(default)]
    decision: Option<String>,
    #[serde(flatten)]
    enrichment: Enrichment,
}

fn default_media_type() -> String {
    "unknown".to_string()
}

impl ImportReport {
    /// Field-level checks are left to the store, which counts failing
    /// reports as rejected instead of aborting the import.
    fn into_report(self, default_server: Option<&str>) -> Result<SessionReport> {
        let server_id = match self.server_id {
            Some(server_id) if !server_id.trim().is_empty() => server_id,
            _ => default_server.unwrap_or_default().to_string(),
        };
        Ok(SessionReport {
            server_id,
            user: self.user,
            title: self.title,
            parent_title: self.parent_title,
            grandparent_title: self.grandparent_title,
            media_type: self.media_type,
            started_at: self.started_at.resolve("started_at")?,
            stopped_at: self.stopped_at.resolve("stopped_at")?,
            watched_ms: self.watched_ms,
            paused_ms: self.paused_ms,
            decision: self
                .decision
                .as_deref()
                .map(Decision::from_label)
                .unwrap_or_default(),
            enrichment: self.enrichment,
        })
    }
}
