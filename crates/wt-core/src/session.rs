//! Watch sessions and the reports they are built from.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Decision, ValidationError};

/// Optional fields filled in after ingestion by a separate enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Identity of a canonical session group.
///
/// Deduplication and merging never cross group boundaries: a different
/// title for the same user at the same instant is a different group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub server_id: String,
    pub user: String,
    pub title: String,
}

/// A playback report as delivered by a poller or importer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub server_id: String,
    pub user: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grandparent_title: Option<String>,
    pub media_type: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    /// Actual playback time; may be less than the wall-clock span.
    #[serde(default)]
    pub watched_ms: i64,
    #[serde(default)]
    pub paused_ms: i64,
    #[serde(default)]
    pub decision: Decision,
    #[serde(flatten)]
    pub enrichment: Enrichment,
}

impl SessionReport {
    /// Checks identity fields, counters and timestamp range.
    ///
    /// The interval itself is not checked here; see [`Self::has_valid_interval`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("server_id", &self.server_id),
            ("user", &self.user),
            ("title", &self.title),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Empty { field });
            }
        }
        if self.watched_ms < 0 {
            return Err(ValidationError::Negative {
                field: "watched_ms",
                value: self.watched_ms,
            });
        }
        if self.paused_ms < 0 {
            return Err(ValidationError::Negative {
                field: "paused_ms",
                value: self.paused_ms,
            });
        }
        self.check_timestamps()
    }

    /// Rejects timestamps whose stored text would not sort chronologically.
    pub fn check_timestamps(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("started_at", self.started_at),
            ("stopped_at", self.stopped_at),
        ] {
            if !is_storable(value) {
                return Err(ValidationError::TimestampOutOfRange { field, value });
            }
        }
        Ok(())
    }

    /// Reports that stop before they start are rejected, never repaired.
    pub fn has_valid_interval(&self) -> bool {
        self.stopped_at >= self.started_at
    }
}

/// Whether a timestamp falls within years 0000-9999.
///
/// Stored timestamps are compared as text, which only orders correctly for
/// four-digit, non-negative years.
pub fn is_storable(timestamp: DateTime<Utc>) -> bool {
    (0..=9999).contains(&timestamp.year())
}

/// The canonical row of record for one playback instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSession {
    pub id: i64,
    pub server_id: String,
    pub user: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grandparent_title: Option<String>,
    pub media_type: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub watched_ms: i64,
    pub paused_ms: i64,
    pub decision: Decision,
    /// Whether enough of the span was actually played to count as watched.
    pub watched: bool,
    #[serde(flatten)]
    pub enrichment: Enrichment,
}
