//! Interval store for canonical watch sessions.
//!
//! Persists sessions using `rusqlite` and applies the consolidation decisions
//! from [`wt_core::dedup`] to them.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! This means a `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! Consolidation reads the rows of a group, decides, and writes inside one
//! `BEGIN IMMEDIATE` transaction. SQLite holds the write lock for the whole
//! sequence, so two connections to the same file cannot both decide to
//! create a row for what should be one merged session.
//!
//! Read-only queries (listing, concurrency) run as single statements and see
//! a snapshot consistent at read time; they may lag an in-flight batch.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2025-01-15T10:30:00.000Z`). Every write goes through the same
//! formatter, so lexicographic ordering matches chronological ordering and
//! range filters can be pushed into SQL.
//!
//! ## Completion Flags
//!
//! One-shot maintenance passes record completion in `store_flags`, keyed by
//! name, so reopening a database does not repeat them.

use std::fmt::Write;
use std::path::Path;

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use rusqlite::{
    Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter,
};
use thiserror::Error;
use wt_core::{
    CancellationToken, CanonicalSpan, ConcurrencyReport, ConsolidationConfig, Decision,
    Disposition, Enrichment, SessionKey, SessionReport, StreamInterval, TimeFilter,
    ValidationError, WatchSession, accumulate, classify, compute_concurrency, is_storable,
    plan_history_consolidation,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The caller cancelled the operation; nothing was committed.
    #[error("operation cancelled")]
    Cancelled,
    /// A raw report failed validation; nothing was committed.
    #[error("invalid session report: {0}")]
    InvalidReport(#[from] ValidationError),
    /// Failed to parse a stored session timestamp.
    #[error("invalid timestamp for session {session_id}: {timestamp}")]
    TimestampParse {
        session_id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
    config: ConsolidationConfig,
}

/// What happened to a single report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new canonical row was inserted.
    Created(i64),
    /// An existing row already covers this playback.
    Skipped { existing_id: i64 },
    /// The report extended an existing row.
    Merged { into_id: i64 },
    /// The report was malformed and ignored.
    Rejected,
}

impl InsertOutcome {
    /// Returned by [`Self::id`] when no row was created.
    pub const NO_NEW_ROW: i64 = 0;

    /// The id of the row created by this insert, or [`Self::NO_NEW_ROW`].
    pub const fn id(&self) -> i64 {
        match self {
            Self::Created(id) => *id,
            Self::Skipped { .. } | Self::Merged { .. } | Self::Rejected => Self::NO_NEW_ROW,
        }
    }
}

/// Counts from a batch insert.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub inserted: usize,
    pub skipped: usize,
    pub merged: usize,
    pub rejected: usize,
}

impl BatchStats {
    fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Created(_) => self.inserted += 1,
            InsertOutcome::Skipped { .. } => self.skipped += 1,
            InsertOutcome::Merged { .. } => self.merged += 1,
            InsertOutcome::Rejected => self.rejected += 1,
        }
    }
}

/// Summary of a history consolidation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConsolidationStats {
    pub groups_scanned: usize,
    pub chains_folded: usize,
    pub rows_absorbed: usize,
    /// The pass had already completed and was not repeated.
    pub already_complete: bool,
}

const HISTORY_CONSOLIDATED_FLAG: &str = "history_consolidated";

/// Sort before and after every stored timestamp.
const EARLIEST_TIMESTAMP: &str = "0000-01-01T00:00:00.000Z";
const LATEST_TIMESTAMP: &str = "9999-12-31T23:59:59.999Z";

const SESSION_COLUMNS: &str = "id, server_id, user_name, title, parent_title, grandparent_title, \
     media_type, started_at, stopped_at, watched_ms, paused_ms, decision, watched, \
     ip_address, platform, player, country, city";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            config: ConsolidationConfig::default(),
        };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            config: ConsolidationConfig::default(),
        };
        db.init()?;
        Ok(db)
    }

    /// Replaces the consolidation settings used by inserts and backfill.
    #[must_use]
    pub fn with_config(mut self, config: ConsolidationConfig) -> Self {
        self.config = config;
        self
    }

    pub const fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Canonical watch sessions
            -- started_at/stopped_at: RFC 3339 with milliseconds (e.g., '2025-01-15T10:30:00.000Z')
            -- decision: 'direct play', 'copy' or 'transcode'
            CREATE TABLE IF NOT EXISTS watch_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id TEXT NOT NULL,
                user_name TEXT NOT NULL,
                title TEXT NOT NULL,
                parent_title TEXT,
                grandparent_title TEXT,
                media_type TEXT NOT NULL,
                started_at TEXT NOT NULL,
                stopped_at TEXT NOT NULL,
                watched_ms INTEGER NOT NULL DEFAULT 0,
                paused_ms INTEGER NOT NULL DEFAULT 0,
                decision TEXT NOT NULL DEFAULT 'direct play',
                watched INTEGER NOT NULL DEFAULT 0,
                ip_address TEXT,
                platform TEXT,
                player TEXT,
                country TEXT,
                city TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_watch_sessions_group
                ON watch_sessions(server_id, user_name, title, started_at);
            CREATE INDEX IF NOT EXISTS idx_watch_sessions_started ON watch_sessions(started_at);
            CREATE INDEX IF NOT EXISTS idx_watch_sessions_stopped ON watch_sessions(stopped_at);

            CREATE TABLE IF NOT EXISTS store_flags (
                name TEXT PRIMARY KEY,
                completed_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts a report, deduplicating and merging it into existing sessions.
    ///
    /// Returns [`InsertOutcome::Created`] with the new id, or an outcome whose
    /// [`InsertOutcome::id`] is `0` when no row was created.
    pub fn insert_session(&mut self, report: &SessionReport) -> Result<InsertOutcome, DbError> {
        if !is_admissible(report) {
            return Ok(InsertOutcome::Rejected);
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = consolidate_report(&tx, report, &self.config)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Inserts an ordered batch of reports as one atomic unit.
    ///
    /// Reports are processed in the order given, each one seeing the rows
    /// written by earlier items. A report can therefore merge into a row
    /// created earlier in the batch but never into one a later item creates.
    ///
    /// `cancel` is checked before every item; cancellation or any storage
    /// failure rolls back the whole batch.
    pub fn insert_sessions(
        &mut self,
        reports: &[SessionReport],
        cancel: &CancellationToken,
    ) -> Result<BatchStats, DbError> {
        let mut stats = BatchStats::default();
        if reports.is_empty() {
            return Ok(stats);
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (index, report) in reports.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    processed = index,
                    total = reports.len(),
                    "batch insert cancelled, rolling back"
                );
                return Err(DbError::Cancelled);
            }
            let outcome = if is_admissible(report) {
                consolidate_report(&tx, report, &self.config)?
            } else {
                InsertOutcome::Rejected
            };
            stats.record(outcome);
        }
        tx.commit()?;

        tracing::info!(
            inserted = stats.inserted,
            skipped = stats.skipped,
            merged = stats.merged,
            rejected = stats.rejected,
            "batch insert committed"
        );
        Ok(stats)
    }

    /// Stores a report as-is, bypassing deduplication.
    ///
    /// Used for history imported before consolidation existed; follow up
    /// with [`Self::consolidate_history`]. Reversed intervals are kept, but
    /// reports failing [`SessionReport::validate`] are refused.
    pub fn append_session(&mut self, report: &SessionReport) -> Result<i64, DbError> {
        report.validate()?;
        insert_row(&self.conn, report, &self.config)
    }

    /// Stores reports as-is in one transaction, bypassing deduplication.
    pub fn append_sessions(&mut self, reports: &[SessionReport]) -> Result<usize, DbError> {
        if reports.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        for report in reports {
            report.validate()?;
            insert_row(&tx, report, &self.config)?;
        }
        tx.commit()?;
        tracing::info!(appended = reports.len(), "appended raw session history");
        Ok(reports.len())
    }

    /// Folds historical fragments into canonical rows.
    ///
    /// Groups rows by (server, user, title), orders each group by start, and
    /// folds every row into its running predecessor when the predecessor's
    /// stop reaches within the consolidation window of the row's start.
    ///
    /// Runs once: completion is recorded and later calls return early unless
    /// `force` is set. Repeating the pass is harmless either way, as an
    /// already-consolidated group has nothing left to fold.
    pub fn consolidate_history(
        &mut self,
        force: bool,
    ) -> Result<HistoryConsolidationStats, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !force && flag_is_set(&tx, HISTORY_CONSOLIDATED_FLAG)? {
            tracing::debug!("history consolidation already complete");
            return Ok(HistoryConsolidationStats {
                already_complete: true,
                ..HistoryConsolidationStats::default()
            });
        }

        let rows = load_history(&tx)?;
        let mut stats = HistoryConsolidationStats::default();
        {
            let mut update_stmt = tx.prepare(
                "
                UPDATE watch_sessions
                SET stopped_at = ?, watched_ms = ?, paused_ms = ?, watched = ?
                WHERE id = ?
                ",
            )?;
            let mut delete_stmt = tx.prepare("DELETE FROM watch_sessions WHERE id = ?")?;

            for group in rows.chunk_by(|a, b| a.0 == b.0) {
                stats.groups_scanned += 1;
                let spans: Vec<CanonicalSpan> = group.iter().map(|(_, span)| *span).collect();
                for plan in plan_history_consolidation(&spans, &self.config) {
                    update_stmt.execute(params![
                        format_timestamp(plan.survivor.stopped_at),
                        plan.survivor.watched_ms,
                        plan.survivor.paused_ms,
                        plan.watched,
                        plan.survivor.id,
                    ])?;
                    for absorbed_id in &plan.absorbed_ids {
                        delete_stmt.execute([absorbed_id])?;
                    }
                    stats.chains_folded += 1;
                    stats.rows_absorbed += plan.absorbed_ids.len();
                }
            }
        }
        set_flag(&tx, HISTORY_CONSOLIDATED_FLAG, Utc::now())?;
        tx.commit()?;

        tracing::info!(
            groups = stats.groups_scanned,
            chains = stats.chains_folded,
            absorbed = stats.rows_absorbed,
            "history consolidation complete"
        );
        Ok(stats)
    }

    /// Whether the history consolidation pass has completed.
    pub fn history_consolidated(&self) -> Result<bool, DbError> {
        flag_is_set(&self.conn, HISTORY_CONSOLIDATED_FLAG)
    }

    /// Fills in enrichment fields for a session.
    ///
    /// Only fields present in `enrichment` are written; interval metrics are
    /// never touched. Returns false if the session does not exist.
    pub fn update_enrichment(&mut self, id: i64, enrichment: &Enrichment) -> Result<bool, DbError> {
        let updated = self.conn.execute(
            "
            UPDATE watch_sessions
            SET ip_address = COALESCE(?, ip_address),
                platform = COALESCE(?, platform),
                player = COALESCE(?, player),
                country = COALESCE(?, country),
                city = COALESCE(?, city)
            WHERE id = ?
            ",
            params![
                enrichment.ip_address,
                enrichment.platform,
                enrichment.player,
                enrichment.country,
                enrichment.city,
                id,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Fetches a session by id.
    pub fn get_session(&self, id: i64) -> Result<Option<WatchSession>, DbError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM watch_sessions WHERE id = ?");
        let row = self
            .conn
            .query_row(&query, [id], SessionRow::from_row)
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Counts all stored sessions.
    pub fn session_count(&self) -> Result<i64, DbError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM watch_sessions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Lists sessions whose interval intersects the filter, ordered by start.
    pub fn list_sessions(
        &self,
        filter: &TimeFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<WatchSession>, DbError> {
        let Some((clause, values)) = filter_clause(filter, now) else {
            return Ok(Vec::new());
        };
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM watch_sessions WHERE {clause} ORDER BY started_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), SessionRow::from_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    /// Computes concurrent-stream analytics for sessions intersecting the filter.
    ///
    /// Sessions with a non-positive duration are excluded.
    pub fn concurrent_streams(
        &self,
        filter: &TimeFilter,
        now: DateTime<Utc>,
    ) -> Result<ConcurrencyReport, DbError> {
        let intervals = self.stream_intervals(filter, now)?;
        Ok(compute_concurrency(&intervals))
    }

    fn stream_intervals(
        &self,
        filter: &TimeFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<StreamInterval>, DbError> {
        let Some((clause, values)) = filter_clause(filter, now) else {
            return Ok(Vec::new());
        };
        let query = format!(
            "
            SELECT id, started_at, stopped_at, decision
            FROM watch_sessions
            WHERE {clause} AND stopped_at > started_at
            "
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut intervals = Vec::new();
        for row in rows {
            let (id, started_at, stopped_at, decision) = row?;
            intervals.push(StreamInterval {
                started_at: parse_timestamp(&started_at, id)?,
                stopped_at: parse_timestamp(&stopped_at, id)?,
                decision: Decision::from_label(&decision),
            });
        }
        tracing::debug!(sessions = intervals.len(), "loaded intervals for concurrency");
        Ok(intervals)
    }
}

/// Malformed reports are dropped before any matching runs.
fn is_admissible(report: &SessionReport) -> bool {
    if let Err(err) = report.validate() {
        tracing::warn!(
            server_id = %report.server_id,
            title = %report.title,
            error = %err,
            "rejected invalid session report"
        );
        return false;
    }
    if !report.has_valid_interval() {
        tracing::debug!(
            server_id = %report.server_id,
            user = %report.user,
            title = %report.title,
            started_at = %report.started_at,
            stopped_at = %report.stopped_at,
            "rejected session report that stops before it starts"
        );
        return false;
    }
    true
}

/// Reads the report's group, classifies the report, and applies the decision.
///
/// Must run inside a transaction that also covers the write.
fn consolidate_report(
    conn: &Connection,
    report: &SessionReport,
    config: &ConsolidationConfig,
) -> Result<InsertOutcome, DbError> {
    let existing = group_spans(conn, report, config)?;
    let outcome = match classify(report.started_at, &existing, config) {
        Disposition::Skip { existing_id } => InsertOutcome::Skipped { existing_id },
        Disposition::Merge { target } => {
            let merged = accumulate(
                &target,
                report.stopped_at,
                report.watched_ms,
                report.paused_ms,
                config,
            );
            conn.execute(
                "
                UPDATE watch_sessions
                SET stopped_at = ?, watched_ms = ?, paused_ms = ?, watched = ?
                WHERE id = ?
                ",
                params![
                    format_timestamp(merged.stopped_at),
                    merged.watched_ms,
                    merged.paused_ms,
                    merged.watched,
                    target.id,
                ],
            )?;
            InsertOutcome::Merged { into_id: target.id }
        }
        Disposition::Create => InsertOutcome::Created(insert_row(conn, report, config)?),
    };
    tracing::debug!(
        server_id = %report.server_id,
        user = %report.user,
        title = %report.title,
        started_at = %report.started_at,
        ?outcome,
        "consolidated session report"
    );
    Ok(outcome)
}

/// Loads rows of the report's group that could skip or absorb it.
///
/// Rows starting after the dedup window past the report can do neither.
fn group_spans(
    conn: &Connection,
    report: &SessionReport,
    config: &ConsolidationConfig,
) -> Result<Vec<CanonicalSpan>, DbError> {
    let upper = report
        .started_at
        .checked_add_signed(config.dedup_window)
        .map_or_else(|| LATEST_TIMESTAMP.to_string(), format_bound);
    let mut stmt = conn.prepare(
        "
        SELECT id, started_at, stopped_at, watched_ms, paused_ms
        FROM watch_sessions
        WHERE server_id = ? AND user_name = ? AND title = ?
          AND started_at <= ? AND stopped_at >= started_at
        ORDER BY started_at ASC, id ASC
        ",
    )?;
    let rows = stmt.query_map(
        params![report.server_id, report.user, report.title, upper],
        span_columns,
    )?;
    let mut spans = Vec::new();
    for row in rows {
        spans.push(row?.into_span()?);
    }
    Ok(spans)
}

fn insert_row(
    conn: &Connection,
    report: &SessionReport,
    config: &ConsolidationConfig,
) -> Result<i64, DbError> {
    let watched = config.is_watched(report.watched_ms, report.started_at, report.stopped_at);
    conn.execute(
        "
        INSERT INTO watch_sessions
        (server_id, user_name, title, parent_title, grandparent_title, media_type,
         started_at, stopped_at, watched_ms, paused_ms, decision, watched,
         ip_address, platform, player, country, city)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            report.server_id,
            report.user,
            report.title,
            report.parent_title,
            report.grandparent_title,
            report.media_type,
            format_timestamp(report.started_at),
            format_timestamp(report.stopped_at),
            report.watched_ms,
            report.paused_ms,
            report.decision.as_str(),
            watched,
            report.enrichment.ip_address,
            report.enrichment.platform,
            report.enrichment.player,
            report.enrichment.country,
            report.enrichment.city,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Loads every well-formed row, ordered by group then start.
fn load_history(conn: &Connection) -> Result<Vec<(SessionKey, CanonicalSpan)>, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT id, started_at, stopped_at, watched_ms, paused_ms, server_id, user_name, title
        FROM watch_sessions
        WHERE stopped_at >= started_at
        ORDER BY server_id ASC, user_name ASC, title ASC, started_at ASC, id ASC
        ",
    )?;
    let rows = stmt.query_map([], |row| {
        let span = span_columns(row)?;
        let key = SessionKey {
            server_id: row.get(5)?,
            user: row.get(6)?,
            title: row.get(7)?,
        };
        Ok((key, span))
    })?;
    let mut history = Vec::new();
    for row in rows {
        let (key, span) = row?;
        history.push((key, span.into_span()?));
    }
    Ok(history)
}

fn flag_is_set(conn: &Connection, name: &str) -> Result<bool, DbError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM store_flags WHERE name = ?", [name], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

fn set_flag(conn: &Connection, name: &str, at: DateTime<Utc>) -> Result<(), DbError> {
    conn.execute(
        "INSERT OR REPLACE INTO store_flags (name, completed_at) VALUES (?, ?)",
        params![name, format_timestamp(at)],
    )?;
    Ok(())
}

/// Builds the WHERE clause for sessions intersecting the filter window.
///
/// Returns `None` when the window is empty.
fn filter_clause(filter: &TimeFilter, now: DateTime<Utc>) -> Option<(String, Vec<String>)> {
    let (start, end) = filter.bounds(now);
    if end <= start {
        return None;
    }
    let mut clause = "started_at < ? AND stopped_at > ?".to_string();
    let mut values = vec![format_bound(end), format_bound(start)];
    if !filter.server_ids.is_empty() {
        let placeholders = vec!["?"; filter.server_ids.len()].join(", ");
        let _ = write!(clause, " AND server_id IN ({placeholders})");
        values.extend(filter.server_ids.iter().cloned());
    }
    Some((clause, values))
}

#[derive(Debug)]
struct SpanRow {
    id: i64,
    started_at: String,
    stopped_at: String,
    watched_ms: i64,
    paused_ms: i64,
}

impl SpanRow {
    fn into_span(self) -> Result<CanonicalSpan, DbError> {
        Ok(CanonicalSpan {
            id: self.id,
            started_at: parse_timestamp(&self.started_at, self.id)?,
            stopped_at: parse_timestamp(&self.stopped_at, self.id)?,
            watched_ms: self.watched_ms,
            paused_ms: self.paused_ms,
        })
    }
}

fn span_columns(row: &Row<'_>) -> rusqlite::Result<SpanRow> {
    Ok(SpanRow {
        id: row.get(0)?,
        started_at: row.get(1)?,
        stopped_at: row.get(2)?,
        watched_ms: row.get(3)?,
        paused_ms: row.get(4)?,
    })
}

#[derive(Debug)]
struct SessionRow {
    id: i64,
    server_id: String,
    user: String,
    title: String,
    parent_title: Option<String>,
    grandparent_title: Option<String>,
    media_type: String,
    started_at: String,
    stopped_at: String,
    watched_ms: i64,
    paused_ms: i64,
    decision: String,
    watched: bool,
    enrichment: Enrichment,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            server_id: row.get(1)?,
            user: row.get(2)?,
            title: row.get(3)?,
            parent_title: row.get(4)?,
            grandparent_title: row.get(5)?,
            media_type: row.get(6)?,
            started_at: row.get(7)?,
            stopped_at: row.get(8)?,
            watched_ms: row.get(9)?,
            paused_ms: row.get(10)?,
            decision: row.get(11)?,
            watched: row.get(12)?,
            enrichment: Enrichment {
                ip_address: row.get(13)?,
                platform: row.get(14)?,
                player: row.get(15)?,
                country: row.get(16)?,
                city: row.get(17)?,
            },
        })
    }

    fn into_session(self) -> Result<WatchSession, DbError> {
        Ok(WatchSession {
            started_at: parse_timestamp(&self.started_at, self.id)?,
            stopped_at: parse_timestamp(&self.stopped_at, self.id)?,
            id: self.id,
            server_id: self.server_id,
            user: self.user,
            title: self.title,
            parent_title: self.parent_title,
            grandparent_title: self.grandparent_title,
            media_type: self.media_type,
            watched_ms: self.watched_ms,
            paused_ms: self.paused_ms,
            decision: Decision::from_label(&self.decision),
            watched: self.watched,
            enrichment: self.enrichment,
        })
    }
}

fn parse_timestamp(timestamp: &str, session_id: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            session_id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Formats a range bound, clamped to the years stored rows can hold.
fn format_bound(bound: DateTime<Utc>) -> String {
    if is_storable(bound) {
        format_timestamp(bound)
    } else if bound.year() > 9999 {
        LATEST_TIMESTAMP.to_string()
    } else {
        EARLIEST_TIMESTAMP.to_string()
    }
}
