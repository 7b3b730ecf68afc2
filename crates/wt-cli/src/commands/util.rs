//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use regex::Regex;
use wt_core::TimeFilter;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").expect("relative time pattern")
});

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Longest accepted trailing window (~1000 years).
const MAX_WINDOW_DAYS: i64 = 1000 * 365;

/// Time window selection shared by analytics commands.
#[derive(Debug, Clone, Args)]
pub struct WindowArgs {
    /// Trailing window in days.
    #[arg(
        long,
        default_value_t = 30,
        value_parser = clap::value_parser!(u32).range(1..=MAX_WINDOW_DAYS),
        conflicts_with_all = ["start", "end"]
    )]
    pub days: u32,

    /// Range start: RFC 3339, YYYY-MM-DD, or relative (e.g., '2 days ago').
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Range end (exclusive), same formats as --start.
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Only include these servers (repeatable).
    #[arg(long = "server")]
    pub servers: Vec<String>,
}

impl WindowArgs {
    /// Builds the store filter, resolving relative times against `now`.
    pub fn to_filter(&self, now: DateTime<Utc>) -> anyhow::Result<TimeFilter> {
        let filter = match (&self.start, &self.end) {
            (Some(start), Some(end)) => {
                let start = parse_datetime(start, now).context("invalid --start")?;
                let end = parse_datetime(end, now).context("invalid --end")?;
                if end <= start {
                    anyhow::bail!("--end must be after --start");
                }
                TimeFilter::between(start, end)
            }
            _ => TimeFilter::last_days(self.days),
        };
        Ok(filter.with_servers(self.servers.iter().cloned()))
    }
}

/// Parse a datetime string as ISO 8601, a calendar date, or relative time.
///
/// Supports:
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Calendar date (midnight UTC): "2026-01-15"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use ISO 8601 (e.g., 2026-01-15T10:30:00Z), a date (2026-01-15) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

/// Formats milliseconds as "Xh Ym" (or "Xm" under an hour).
pub fn format_duration(ms: i64) -> String {
    if ms < 0 {
        return "0m".to_string();
    }
    let total_minutes = ms / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
