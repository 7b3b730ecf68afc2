//! Concurrency command for peak and hourly concurrent streams.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use wt_core::{ConcurrencyReport, Decision, TimeFilter};
use wt_db::Database;

const HOUR_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    filter: &TimeFilter,
    now: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    let report = db
        .concurrent_streams(filter, now)
        .context("failed to compute concurrent streams")?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to encode concurrency")?;
        writeln!(writer, "{rendered}")?;
        return Ok(());
    }

    let (start, end) = filter.bounds(now);
    write_human(writer, &report, start, end)
}

fn write_human<W: Write>(
    writer: &mut W,
    report: &ConcurrencyReport,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<()> {
    writeln!(
        writer,
        "Concurrent streams ({} to {} UTC)",
        start.format(HOUR_FORMAT),
        end.format(HOUR_FORMAT)
    )?;

    let Some(peak_at) = report.peaks.total_at else {
        writeln!(writer, "No sessions in range.")?;
        return Ok(());
    };

    writeln!(
        writer,
        "Peak: {} at {} UTC",
        report.peaks.total,
        peak_at.format(HOUR_FORMAT)
    )?;
    for decision in Decision::ALL {
        writeln!(
            writer,
            "  {}: {}",
            decision,
            report.peaks.by_decision.get(decision)
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "Hourly maximum:")?;
    for point in &report.series {
        let breakdown: Vec<String> = Decision::ALL
            .iter()
            .map(|decision| format!("{decision} {}", point.by_decision.get(*decision)))
            .collect();
        writeln!(
            writer,
            "  {}  {}  ({})",
            point.hour.format(HOUR_FORMAT),
            point.total,
            breakdown.join(", ")
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};
    use insta::assert_snapshot;
    use wt_core::{CancellationToken, Enrichment, SessionReport};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 20, 0, 0).unwrap()
    }

    fn session(user: &str, start_min: i64, stop_min: i64, decision: Decision) -> SessionReport {
        SessionReport {
            server_id: "srv-1".to_string(),
            user: user.to_string(),
            title: "Heat".to_string(),
            parent_title: None,
            grandparent_title: None,
            media_type: "movie".to_string(),
            started_at: base() + Duration::minutes(start_min),
            stopped_at: base() + Duration::minutes(stop_min),
            watched_ms: 0,
            paused_ms: 0,
            decision,
            enrichment: Enrichment::default(),
        }
    }

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_sessions(
            &[
                session("alice", 0, 30, Decision::DirectPlay),
                session("bob", 10, 70, Decision::Transcode),
                session("carol", 15, 40, Decision::Copy),
                session("dave", 65, 90, Decision::Transcode),
            ],
            &CancellationToken::new(),
        )
        .unwrap();
        db
    }

    #[test]
    fn concurrency_command_outputs_peaks_and_series() {
        let db = seeded_db();
        let filter = TimeFilter::between(base(), base() + Duration::hours(3));
        let mut output = Vec::new();
        run(&mut output, &db, &filter, base(), false).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Concurrent streams (2025-01-01 20:00 to 2025-01-01 23:00 UTC)
        Peak: 3 at 2025-01-01 20:15 UTC
          direct play: 1
          copy: 1
          transcode: 2

        Hourly maximum:
          2025-01-01 20:00  3  (direct play 1, copy 1, transcode 1)
          2025-01-01 21:00  2  (direct play 0, copy 0, transcode 2)
        ");
    }

    #[test]
    fn concurrency_command_reports_empty_range() {
        let db = Database::open_in_memory().unwrap();
        let filter = TimeFilter::between(base(), base() + Duration::hours(1));
        let mut output = Vec::new();
        run(&mut output, &db, &filter, base(), false).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Concurrent streams (2025-01-01 20:00 to 2025-01-01 21:00 UTC)\nNo sessions in range.\n"
        );
    }

    #[test]
    fn concurrency_command_outputs_json() {
        let db = seeded_db();
        let filter = TimeFilter::between(base(), base() + Duration::hours(3));
        let mut output = Vec::new();
        run(&mut output, &db, &filter, base(), true).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["peaks"]["total"], 3);
        assert_eq!(value["peaks"]["transcode"], 2);
        assert_eq!(value["peaks"]["total_at"], "2025-01-01T20:15:00Z");
        assert_eq!(value["series"].as_array().unwrap().len(), 2);
        assert_eq!(value["series"][1]["hour"], "2025-01-01T21:00:00Z");
    }
}
