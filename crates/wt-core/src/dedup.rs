//! Deduplication and consolidation of watch-session reports.
//!
//! Independent collectors (a real-time poller and a retrospective importer,
//! say) describe the same playback with slightly different start instants,
//! and a single playback can arrive as several fragments. Every report is
//! classified against the canonical rows of its group:
//!
//! 1. **Skip** when an existing row started within the dedup window.
//! 2. **Merge** into the most recently started earlier row whose stop lies
//!    within the consolidation window of the report's start.
//! 3. **Create** otherwise.
//!
//! The functions here are pure; the store applies their decisions inside a
//! transaction.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Invalid consolidation settings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} cannot be negative")]
    NegativeWindow { field: &'static str },

    #[error("{field} is too large")]
    WindowOutOfRange { field: &'static str },

    #[error("watched threshold must be between 0.0 and 1.0, got {value}")]
    ThresholdOutOfRange { value: f64 },
}

/// Tunables for consolidation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsolidationConfig {
    /// Start-time tolerance within which two reports are the same playback.
    /// Default: 60 seconds.
    pub dedup_window: Duration,

    /// Largest gap between a row's stop and a report's start that still
    /// extends the row. Default: 30 minutes.
    pub consolidation_window: Duration,

    /// Fraction of the wall-clock span that must be played for the session
    /// to count as watched. Default: 0.85.
    pub watched_threshold: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::seconds(60),
            consolidation_window: Duration::minutes(30),
            watched_threshold: 0.85,
        }
    }
}

impl ConsolidationConfig {
    pub fn new(
        dedup_window: Duration,
        consolidation_window: Duration,
        watched_threshold: f64,
    ) -> Result<Self, ConfigError> {
        if dedup_window < Duration::zero() {
            return Err(ConfigError::NegativeWindow {
                field: "dedup_window",
            });
        }
        if consolidation_window < Duration::zero() {
            return Err(ConfigError::NegativeWindow {
                field: "consolidation_window",
            });
        }
        if !(0.0..=1.0).contains(&watched_threshold) {
            return Err(ConfigError::ThresholdOutOfRange {
                value: watched_threshold,
            });
        }
        Ok(Self {
            dedup_window,
            consolidation_window,
            watched_threshold,
        })
    }

    /// Applies the watched rule to a span.
    ///
    /// A zero-length span is never watched.
    #[expect(
        clippy::cast_precision_loss,
        reason = "millisecond counts stay far below 2^52"
    )]
    pub fn is_watched(
        &self,
        watched_ms: i64,
        started_at: DateTime<Utc>,
        stopped_at: DateTime<Utc>,
    ) -> bool {
        let duration_ms = (stopped_at - started_at).num_milliseconds();
        if duration_ms <= 0 {
            return false;
        }
        watched_ms as f64 / duration_ms as f64 >= self.watched_threshold
    }
}

/// The interval and metrics of a canonical row, as seen by consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalSpan {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub watched_ms: i64,
    pub paused_ms: i64,
}

/// Outcome of classifying a report against its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// An existing row already describes this playback.
    Skip { existing_id: i64 },
    /// The report continues an earlier row.
    Merge { target: CanonicalSpan },
    /// The report starts a new canonical row.
    Create,
}

/// Classifies a report starting at `started_at` against the rows of its group.
///
/// `existing` may be in any order and may include rows that started after
/// the report; those can trigger a skip but are never merge targets.
pub fn classify(
    started_at: DateTime<Utc>,
    existing: &[CanonicalSpan],
    config: &ConsolidationConfig,
) -> Disposition {
    if let Some(duplicate) = existing
        .iter()
        .find(|span| (span.started_at - started_at).abs() <= config.dedup_window)
    {
        return Disposition::Skip {
            existing_id: duplicate.id,
        };
    }

    let merge_target = existing
        .iter()
        .filter(|span| span.started_at < started_at)
        .filter(|span| started_at - span.stopped_at <= config.consolidation_window)
        .max_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));

    match merge_target {
        Some(target) => Disposition::Merge { target: *target },
        None => Disposition::Create,
    }
}

/// Metrics of a row after a fragment has been folded into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accumulated {
    pub stopped_at: DateTime<Utc>,
    pub watched_ms: i64,
    pub paused_ms: i64,
    pub watched: bool,
}

/// Folds a fragment into `target`.
///
/// The start never moves; the stop only grows; counters are summed.
pub fn accumulate(
    target: &CanonicalSpan,
    stopped_at: DateTime<Utc>,
    watched_ms: i64,
    paused_ms: i64,
    config: &ConsolidationConfig,
) -> Accumulated {
    let stopped_at = target.stopped_at.max(stopped_at);
    let watched_ms = target.watched_ms.saturating_add(watched_ms.max(0));
    let paused_ms = target.paused_ms.saturating_add(paused_ms.max(0));
    Accumulated {
        stopped_at,
        watched_ms,
        paused_ms,
        watched: config.is_watched(watched_ms, target.started_at, stopped_at),
    }
}

/// A chain of historical rows collapsed onto its earliest member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldPlan {
    pub survivor: CanonicalSpan,
    pub watched: bool,
    pub absorbed_ids: Vec<i64>,
}

/// Plans the backfill pass for one group.
///
/// `group` must be sorted by start ascending. Each row is folded into the
/// running survivor when the survivor's stop reaches within the
/// consolidation window of the row's start. Only chains that absorbed at
/// least one row are returned, so an already-consolidated group yields an
/// empty plan.
pub fn plan_history_consolidation(
    group: &[CanonicalSpan],
    config: &ConsolidationConfig,
) -> Vec<FoldPlan> {
    let mut plans = Vec::new();
    let mut iter = group.iter();
    let Some(first) = iter.next() else {
        return plans;
    };

    let mut current = FoldPlan {
        survivor: *first,
        watched: false,
        absorbed_ids: Vec::new(),
    };

    for span in iter {
        if span.started_at - current.survivor.stopped_at <= config.consolidation_window {
            let merged = accumulate(
                &current.survivor,
                span.stopped_at,
                span.watched_ms,
                span.paused_ms,
                config,
            );
            current.survivor.stopped_at = merged.stopped_at;
            current.survivor.watched_ms = merged.watched_ms;
            current.survivor.paused_ms = merged.paused_ms;
            current.watched = merged.watched;
            current.absorbed_ids.push(span.id);
        } else {
            let finished = std::mem::replace(
                &mut current,
                FoldPlan {
                    survivor: *span,
                    watched: false,
                    absorbed_ids: Vec::new(),
                },
            );
            if !finished.absorbed_ids.is_empty() {
                plans.push(finished);
            }
        }
    }
    if !current.absorbed_ids.is_empty() {
        plans.push(current);
    }

    tracing::trace!(
        rows = group.len(),
        chains = plans.len(),
        "planned history consolidation"
    );
    plans
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 20, 0, 0).unwrap()
    }

    fn span(id: i64, start_min: i64, stop_min: i64, watched_ms: i64) -> CanonicalSpan {
        CanonicalSpan {
            id,
            started_at: base() + Duration::minutes(start_min),
            stopped_at: base() + Duration::minutes(stop_min),
            watched_ms,
            paused_ms: 0,
        }
    }

    #[test]
    fn start_within_sixty_seconds_is_skipped() {
        let config = ConsolidationConfig::default();
        let existing = [span(1, 0, 40, 1000)];

        let later = base() + Duration::seconds(60);
        assert_eq!(
            classify(later, &existing, &config),
            Disposition::Skip { existing_id: 1 }
        );

        let earlier = base() - Duration::seconds(60);
        assert_eq!(
            classify(earlier, &existing, &config),
            Disposition::Skip { existing_id: 1 }
        );
    }

    #[test]
    fn start_sixty_one_seconds_in_overlap_merges() {
        let config = ConsolidationConfig::default();
        let existing = [span(1, 0, 40, 1000)];

        let candidate = base() + Duration::seconds(61);
        assert_eq!(
            classify(candidate, &existing, &config),
            Disposition::Merge {
                target: existing[0]
            }
        );
    }

    #[test]
    fn gap_of_exactly_thirty_minutes_merges() {
        let config = ConsolidationConfig::default();
        let existing = [span(1, 0, 40, 1000)];

        assert_eq!(
            classify(base() + Duration::minutes(70), &existing, &config),
            Disposition::Merge {
                target: existing[0]
            }
        );
        assert_eq!(
            classify(
                base() + Duration::minutes(70) + Duration::seconds(1),
                &existing,
                &config
            ),
            Disposition::Create
        );
    }

    #[test]
    fn later_starting_rows_are_never_merge_targets() {
        let config = ConsolidationConfig::default();
        let existing = [span(7, 10, 50, 1000)];

        assert_eq!(classify(base(), &existing, &config), Disposition::Create);
    }

    #[test]
    fn most_recently_started_eligible_row_wins() {
        let config = ConsolidationConfig::default();
        let existing = [span(1, 0, 100, 1000), span(2, 30, 60, 1000)];

        assert_eq!(
            classify(base() + Duration::minutes(80), &existing, &config),
            Disposition::Merge {
                target: existing[1]
            }
        );
    }

    #[test]
    fn accumulate_extends_stop_and_sums_counters() {
        let config = ConsolidationConfig::default();
        let target = CanonicalSpan {
            paused_ms: 500,
            ..span(1, 0, 40, 30 * 60_000)
        };

        let merged = accumulate(&target, base() + Duration::minutes(60), 15 * 60_000, 250, &config);
        assert_eq!(merged.stopped_at, base() + Duration::minutes(60));
        assert_eq!(merged.watched_ms, 45 * 60_000);
        assert_eq!(merged.paused_ms, 750);
        assert!(!merged.watched);

        let shorter = accumulate(&target, base() + Duration::minutes(20), 5 * 60_000, 0, &config);
        assert_eq!(shorter.stopped_at, target.stopped_at);
        assert!(shorter.watched);
    }

    #[test]
    fn zero_length_span_is_not_watched() {
        let config = ConsolidationConfig::default();
        assert!(!config.is_watched(10_000, base(), base()));
    }

    #[test]
    fn config_rejects_out_of_range_threshold() {
        let err = ConsolidationConfig::new(Duration::seconds(60), Duration::minutes(30), 1.5)
            .unwrap_err();
        assert_eq!(err, ConfigError::ThresholdOutOfRange { value: 1.5 });

        let err = ConsolidationConfig::new(Duration::seconds(-1), Duration::minutes(30), 0.5)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::NegativeWindow {
                field: "dedup_window"
            }
        );
    }

    #[test]
    fn abutting_chain_folds_into_one_survivor() {
        let config = ConsolidationConfig::default();
        let group = [
            span(1, 0, 10, 600_000),
            span(2, 10, 20, 600_000),
            span(3, 20, 30, 600_000),
            span(4, 30, 40, 600_000),
        ];

        let plans = plan_history_consolidation(&group, &config);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].survivor.id, 1);
        assert_eq!(plans[0].survivor.started_at, base());
        assert_eq!(plans[0].survivor.stopped_at, base() + Duration::minutes(40));
        assert_eq!(plans[0].survivor.watched_ms, 2_400_000);
        assert_eq!(plans[0].absorbed_ids, vec![2, 3, 4]);
        assert!(plans[0].watched);
    }

    #[test]
    fn separated_chains_are_planned_independently() {
        let config = ConsolidationConfig::default();
        let group = [
            span(1, 0, 10, 1),
            span(2, 20, 30, 1),
            span(3, 120, 130, 1),
            span(4, 300, 310, 1),
            span(5, 315, 320, 1),
        ];

        let plans = plan_history_consolidation(&group, &config);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].absorbed_ids, vec![2]);
        assert_eq!(plans[1].survivor.id, 4);
        assert_eq!(plans[1].absorbed_ids, vec![5]);
    }

    #[test]
    fn consolidated_group_plans_nothing() {
        let config = ConsolidationConfig::default();
        let group = [span(1, 0, 40, 1), span(2, 120, 160, 1)];

        assert!(plan_history_consolidation(&group, &config).is_empty());
        assert!(plan_history_consolidation(&[], &config).is_empty());
    }
}
