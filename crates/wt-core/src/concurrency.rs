//! Concurrent stream analytics.
//!
//! # Algorithm Summary
//!
//! 1. Drop intervals with a non-positive duration
//! 2. Emit a start edge and a stop edge per interval, tagged with its decision
//! 3. Sort edges by time, stops before starts at the same instant, so
//!    touching intervals are never concurrent
//! 4. Sweep once, tracking the overall and per-decision running counts,
//!    their peaks, and the busiest snapshot within each hour

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;

use crate::types::Decision;

/// Which sessions a concurrency query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeRange {
    /// The trailing `n` days up to the query instant.
    LastDays(u32),
    /// An explicit half-open range.
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Time window plus an optional server subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFilter {
    pub range: TimeRange,
    /// Empty means every server.
    pub server_ids: Vec<String>,
}

impl TimeFilter {
    pub const fn last_days(days: u32) -> Self {
        Self {
            range: TimeRange::LastDays(days),
            server_ids: Vec::new(),
        }
    }

    pub const fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            range: TimeRange::Between { start, end },
            server_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_servers<I, S>(mut self, server_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_ids = server_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Resolves the range to concrete bounds relative to `now`.
    ///
    /// A trailing window reaching past the earliest representable instant
    /// starts at [`DateTime::<Utc>::MIN_UTC`].
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match &self.range {
            TimeRange::LastDays(days) => {
                let start = Duration::try_days(i64::from(*days))
                    .and_then(|span| now.checked_sub_signed(span))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                (start, now)
            }
            TimeRange::Between { start, end } => (*start, *end),
        }
    }
}

/// The span of one canonical session, as needed by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInterval {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub decision: Decision,
}

/// Stream counts per decision class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionCounts {
    pub direct_play: u32,
    pub copy: u32,
    pub transcode: u32,
}

impl DecisionCounts {
    pub const fn get(&self, decision: Decision) -> u32 {
        match decision {
            Decision::DirectPlay => self.direct_play,
            Decision::Copy => self.copy,
            Decision::Transcode => self.transcode,
        }
    }

    const fn get_mut(&mut self, decision: Decision) -> &mut u32 {
        match decision {
            Decision::DirectPlay => &mut self.direct_play,
            Decision::Copy => &mut self.copy,
            Decision::Transcode => &mut self.transcode,
        }
    }
}

/// Busiest snapshot observed within one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConcurrencyPoint {
    /// Start of the hour.
    pub hour: DateTime<Utc>,
    pub total: u32,
    #[serde(flatten)]
    pub by_decision: DecisionCounts,
}

/// Peak concurrent streams.
///
/// Each class peak is tracked on its own counter and need not coincide with
/// the overall peak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConcurrencyPeaks {
    pub total: u32,
    /// When the overall peak was first reached.
    pub total_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub by_decision: DecisionCounts,
}

/// Result of a concurrency sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConcurrencyReport {
    /// Hourly series, ascending by hour.
    pub series: Vec<ConcurrencyPoint>,
    pub peaks: ConcurrencyPeaks,
}

/// Stops sort before starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Edge {
    Stop,
    Start,
}

#[derive(Debug)]
struct SweepEvent {
    at: DateTime<Utc>,
    edge: Edge,
    decision: Decision,
}

/// Computes peaks and the hourly series for a set of intervals.
pub fn compute_concurrency(intervals: &[StreamInterval]) -> ConcurrencyReport {
    let mut events: Vec<SweepEvent> = Vec::with_capacity(intervals.len() * 2);
    for interval in intervals {
        if interval.stopped_at <= interval.started_at {
            continue;
        }
        events.push(SweepEvent {
            at: interval.started_at,
            edge: Edge::Start,
            decision: interval.decision,
        });
        events.push(SweepEvent {
            at: interval.stopped_at,
            edge: Edge::Stop,
            decision: interval.decision,
        });
    }
    events.sort_by(|a, b| a.at.cmp(&b.at).then(a.edge.cmp(&b.edge)));

    let mut total: u32 = 0;
    let mut running = DecisionCounts::default();
    let mut peaks = ConcurrencyPeaks::default();
    let mut buckets: BTreeMap<DateTime<Utc>, ConcurrencyPoint> = BTreeMap::new();

    for event in &events {
        let counter = running.get_mut(event.decision);
        match event.edge {
            Edge::Start => {
                *counter += 1;
                total += 1;
            }
            Edge::Stop => {
                *counter = counter.saturating_sub(1);
                total = total.saturating_sub(1);
            }
        }

        if total > peaks.total {
            peaks.total = total;
            peaks.total_at = Some(event.at);
        }
        for decision in Decision::ALL {
            let current = running.get(decision);
            let peak = peaks.by_decision.get_mut(decision);
            if current > *peak {
                *peak = current;
            }
        }

        let hour = truncate_to_hour(event.at);
        let stored = buckets.get(&hour).map_or(0, |point| point.total);
        if total > stored {
            buckets.insert(
                hour,
                ConcurrencyPoint {
                    hour,
                    total,
                    by_decision: running,
                },
            );
        }
    }

    tracing::debug!(
        intervals = intervals.len(),
        events = events.len(),
        peak = peaks.total,
        buckets = buckets.len(),
        "computed concurrency"
    );

    ConcurrencyReport {
        series: buckets.into_values().collect(),
        peaks,
    }
}

fn truncate_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::hours(1)).unwrap_or(at)
}
