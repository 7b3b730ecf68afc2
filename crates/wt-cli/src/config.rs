//! Configuration loading and management.

use std::path::{Path, PathBuf};

use chrono::Duration;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wt_core::{ConfigError, ConsolidationConfig};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Deduplication and merge tunables.
    #[serde(default)]
    pub consolidation: ConsolidationSettings,
}

/// Consolidation tunables as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationSettings {
    /// Start-time tolerance for duplicate reports, in seconds.
    pub dedup_window_secs: i64,
    /// Largest gap that still extends a session, in minutes.
    pub consolidation_window_mins: i64,
    /// Share of the session span that must be played to count as watched.
    pub watched_threshold_percent: f64,
}

impl Default for ConsolidationSettings {
    fn default() -> Self {
        Self {
            dedup_window_secs: 60,
            consolidation_window_mins: 30,
            watched_threshold_percent: 85.0,
        }
    }
}

impl ConsolidationSettings {
    /// Validates the settings and converts them for the store.
    pub fn to_config(&self) -> Result<ConsolidationConfig, ConfigError> {
        let dedup_window = Duration::try_seconds(self.dedup_window_secs).ok_or(
            ConfigError::WindowOutOfRange {
                field: "dedup_window_secs",
            },
        )?;
        let consolidation_window = Duration::try_minutes(self.consolidation_window_mins).ok_or(
            ConfigError::WindowOutOfRange {
                field: "consolidation_window_mins",
            },
        )?;
        ConsolidationConfig::new(
            dedup_window,
            consolidation_window,
            self.watched_threshold_percent / 100.0,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("wt.db"),
            consolidation: ConsolidationSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (WT_*, WT_CONSOLIDATION__* for nested keys)
        figment = figment.merge(Env::prefixed("WT_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for wt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wt"))
}

/// Returns the platform-specific data directory for wt.
///
/// On Linux: `~/.local/share/wt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("wt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_dirs_data_path_ends_with_wt() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "wt");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("wt.db"));
        assert_eq!(config.consolidation, ConsolidationSettings::default());
    }

    #[test]
    fn test_default_settings_match_store_defaults() {
        let config = ConsolidationSettings::default().to_config().unwrap();
        assert_eq!(config, ConsolidationConfig::default());
    }

    #[test]
    fn test_config_file_overrides_consolidation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/tmp/wt-test.db"

[consolidation]
consolidation_window_mins = 10
watched_threshold_percent = 90.0
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/wt-test.db"));
        assert_eq!(config.consolidation.dedup_window_secs, 60);
        assert_eq!(config.consolidation.consolidation_window_mins, 10);

        let store = config.consolidation.to_config().unwrap();
        assert_eq!(store.consolidation_window, Duration::minutes(10));
        assert!((store.watched_threshold - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let settings = ConsolidationSettings {
            watched_threshold_percent: 120.0,
            ..ConsolidationSettings::default()
        };
        assert!(settings.to_config().is_err());
    }

    #[test]
    fn test_oversized_windows_are_rejected() {
        let settings = ConsolidationSettings {
            consolidation_window_mins: 999_999_999_999_999_999,
            ..ConsolidationSettings::default()
        };
        assert_eq!(
            settings.to_config(),
            Err(ConfigError::WindowOutOfRange {
                field: "consolidation_window_mins",
            })
        );

        let settings = ConsolidationSettings {
            dedup_window_secs: i64::MAX,
            ..ConsolidationSettings::default()
        };
        assert_eq!(
            settings.to_config(),
            Err(ConfigError::WindowOutOfRange {
                field: "dedup_window_secs",
            })
        );
    }
}
