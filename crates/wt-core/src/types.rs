//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A millisecond counter was negative.
    #[error("{field} cannot be negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    /// A timestamp outside the four-digit years the store can order.
    #[error("{field} is outside years 0000-9999, got {value}")]
    TimestampOutOfRange {
        field: &'static str,
        value: DateTime<Utc>,
    },
}

/// How a stream was served to the client.
///
/// Stored labels follow the media server vocabulary (`direct play`, `copy`,
/// `transcode`). Anything else, including empty and legacy values, is
/// treated as direct play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Decision {
    /// Served unmodified.
    #[default]
    DirectPlay,
    /// Repackaged without re-encoding (direct stream).
    Copy,
    /// Re-encoded on the server.
    Transcode,
}

impl Decision {
    /// Every tracked decision class, in display order.
    pub const ALL: [Self; 3] = [Self::DirectPlay, Self::Copy, Self::Transcode];

    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DirectPlay => "direct play",
            Self::Copy => "copy",
            Self::Transcode => "transcode",
        }
    }

    /// Maps a reported label onto a decision class.
    ///
    /// Never fails: unknown labels fall back to [`Decision::DirectPlay`].
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "transcode" => Self::Transcode,
            "copy" | "direct stream" | "direct_stream" | "directstream" => Self::Copy,
            _ => Self::DirectPlay,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Decision {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

impl From<Decision> for String {
    fn from(value: Decision) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_label_recognizes_media_server_vocabulary() {
        assert_eq!(Decision::from_label("transcode"), Decision::Transcode);
        assert_eq!(Decision::from_label("Transcode "), Decision::Transcode);
        assert_eq!(Decision::from_label("copy"), Decision::Copy);
        assert_eq!(Decision::from_label("Direct Stream"), Decision::Copy);
        assert_eq!(Decision::from_label("direct play"), Decision::DirectPlay);
    }

    #[test]
    fn from_label_defaults_unknown_values_to_direct_play() {
        assert_eq!(Decision::from_label(""), Decision::DirectPlay);
        assert_eq!(Decision::from_label("hw-transcode-v2"), Decision::DirectPlay);
    }

    #[test]
    fn decision_serializes_as_stored_label() {
        let json = serde_json::to_string(&Decision::Copy).unwrap();
        assert_eq!(json, r#""copy""#);

        let parsed: Decision = serde_json::from_str(r#""legacy""#).unwrap();
        assert_eq!(parsed, Decision::DirectPlay);
    }
}
