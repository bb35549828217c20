//! Configuration for vocablog
//!
//! Loaded from `config.toml` in the data directory. Every section falls back
//! to defaults, so a partial file (or no file at all) is valid.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::learning::Grouping;

/// Complete configuration, passed by reference into each component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub snapshots: SnapshotSettings,
    pub time: TimeSettings,
    pub learning: LearningSettings,
    pub report: ReportSettings,
}

/// Where snapshot captures live and how to read them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Root folder holding one sub-folder per capture (relative to the data dir)
    pub folder: PathBuf,
    /// Database file name inside each capture folder
    pub database_file: String,
    /// Score table to read (the source keeps one per scoring profile)
    pub scores_table: String,
    /// Regex a capture folder name must match
    pub folder_pattern: String,
    /// chrono format of the capture time encoded in the folder name
    pub folder_format: String,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("snapshots"),
            database_file: "Pleco Flashcard Database.pqb".to_string(),
            scores_table: "pleco_flash_scores_1".to_string(),
            folder_pattern: r"^\d{4}-\d{2}-\d{2} \d{2}\.\d{2}\.\d{2}$".to_string(),
            folder_format: "%Y-%m-%d %H.%M.%S".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSettings {
    /// Zone whose calendar dates reviews are grouped and reported by
    pub timezone: Zone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSettings {
    /// Outcome codes at or above this count as correct (0-5 scale)
    pub correct_threshold: u8,
    /// Whether learning state is tracked per card or per headword
    pub group_by: Grouping,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            correct_threshold: 4,
            group_by: Grouping::Card,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Length of the default `words` report window, ending today
    pub window_days: u32,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self { window_days: 7 }
    }
}

/// Time zone setting: `local`, `utc`, or a fixed offset like `-05:00`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Zone {
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl Zone {
    /// Wall-clock time of an instant in this zone
    pub fn local_time(&self, at: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Zone::Local => at.with_timezone(&Local).naive_local(),
            Zone::Utc => at.naive_utc(),
            Zone::Fixed(offset) => at.with_timezone(offset).naive_local(),
        }
    }

    /// Calendar date an instant falls on in this zone
    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        self.local_time(at).date()
    }

    /// Today's date in this zone
    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "local" => Ok(Zone::Local),
            "utc" | "z" => Ok(Zone::Utc),
            _ => s
                .parse::<FixedOffset>()
                .map(Zone::Fixed)
                .map_err(|e| format!("unknown time zone {:?} (use local, utc or +HH:MM): {}", s, e)),
        }
    }
}

impl TryFrom<String> for Zone {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Zone> for String {
    fn from(zone: Zone) -> Self {
        zone.to_string()
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Local => write!(f, "local"),
            Zone::Utc => write!(f, "utc"),
            Zone::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

impl Config {
    /// Snapshot root, resolved against the data directory when relative
    pub fn snapshot_root(&self, home: &Path) -> PathBuf {
        if self.snapshots.folder.is_absolute() {
            self.snapshots.folder.clone()
        } else {
            home.join(&self.snapshots.folder)
        }
    }
}

/// Load configuration from file, or defaults when the file does not exist
pub fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {:?}", config_path))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {:?}", config_path))?;
    Ok(config)
}

pub const DEFAULT_CONFIG: &str = r#"# vocablog configuration

[snapshots]
# Folder holding one sub-folder per capture, named by capture time
folder = "snapshots"
# Database file inside each capture folder
database_file = "Pleco Flashcard Database.pqb"
# Score table (one per scoring profile)
scores_table = "pleco_flash_scores_1"
# Capture folder names must match this pattern and parse with this format
folder_pattern = '^\d{4}-\d{2}-\d{2} \d{2}\.\d{2}\.\d{2}$'
folder_format = "%Y-%m-%d %H.%M.%S"

[time]
# Zone whose calendar dates reviews are counted under:
# "local", "utc", or a fixed offset such as "-05:00"
timezone = "local"

[learning]
# Outcome codes (0-5) at or above this count as correct
correct_threshold = 4
# Track learned state per "card" or per "headword"
group_by = "card"

[report]
# Days covered by the default words report
window_days = 7
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file_matches_defaults() {
        let parsed: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_config() {
        let parsed: Config = toml::from_str(
            r#"
            [time]
            timezone = "-05:00"

            [learning]
            group_by = "headword"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.time.timezone, Zone::Fixed(FixedOffset::west_opt(5 * 3600).unwrap()));
        assert_eq!(parsed.learning.group_by, Grouping::Headword);
        assert_eq!(parsed.learning.correct_threshold, 4);
        assert_eq!(parsed.snapshots, SnapshotSettings::default());
    }

    #[test]
    fn test_zone_parsing() {
        assert_eq!("UTC".parse::<Zone>().unwrap(), Zone::Utc);
        assert_eq!("local".parse::<Zone>().unwrap(), Zone::Local);
        assert_eq!(
            "+08:00".parse::<Zone>().unwrap(),
            Zone::Fixed(FixedOffset::east_opt(8 * 3600).unwrap())
        );
        assert_eq!(
            "-05:30".parse::<Zone>().unwrap(),
            Zone::Fixed(FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert!("America/Toronto".parse::<Zone>().is_err());
        assert!("+25:00".parse::<Zone>().is_err());
        assert!("".parse::<Zone>().is_err());
    }

    #[test]
    fn test_fixed_zone_local_time() {
        let zone: Zone = "-05:00".parse().unwrap();
        // 2019-01-30 03:00:00 UTC
        let at = DateTime::<Utc>::from_timestamp(1_548_817_200, 0).unwrap();
        assert_eq!(zone.local_time(at).to_string(), "2019-01-29 22:00:00");
        assert_eq!(zone.date_of(at).to_string(), "2019-01-29");
        assert_eq!(Zone::Utc.date_of(at).to_string(), "2019-01-30");
    }

    #[test]
    fn test_snapshot_root_resolution() {
        let config = Config::default();
        assert_eq!(
            config.snapshot_root(Path::new("/data")),
            PathBuf::from("/data/snapshots")
        );
    }
}
