//! Snapshot reader
//!
//! Loads the per-card counters from a captured flashcard database. The
//! capture is opened read-only; it is never modified.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ItemKey, ItemScore, Snapshot, SnapshotId};
use crate::config::Config;
use crate::error::{IntegrityFault, SnapshotError};

pub struct SnapshotReader {
    root: PathBuf,
    database_file: String,
    scores_table: String,
}

impl SnapshotReader {
    pub fn new(root: PathBuf, config: &Config) -> Self {
        Self {
            root,
            database_file: config.snapshots.database_file.clone(),
            scores_table: config.snapshots.scores_table.clone(),
        }
    }

    pub fn database_path(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(&id.folder).join(&self.database_file)
    }

    /// Read every card and its score row from one capture
    ///
    /// Cards without a score row (never reviewed) get zero counters.
    pub fn read(&self, id: &SnapshotId) -> Result<Snapshot, SnapshotError> {
        let path = self.database_path(id);
        if !path.is_file() {
            return Err(SnapshotError::Missing(path));
        }
        if !is_identifier(&self.scores_table) {
            return Err(SnapshotError::BadSetting(format!(
                "scores_table {:?} is not a table name",
                self.scores_table
            )));
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| sqlite_error(&path, source))?;

        let sql = format!(
            r#"
            SELECT c.dictid, c.dictentry, c.hw, c.created,
                   s.reviewed, s.firstreviewedtime, s.lastreviewedtime, s.history
            FROM pleco_flash_cards c
            LEFT JOIN {} s ON s.card = c.id
            ORDER BY c.id
            "#,
            self.scores_table
        );
        let mut stmt = conn.prepare(&sql).map_err(|source| sqlite_error(&path, source))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Value>(7)?,
                ))
            })
            .map_err(|source| sqlite_error(&path, source))?;

        let mut snapshot = Snapshot::new(id.clone());
        for row in rows {
            let (dict_id, dict_entry, hw, created, reviewed, first, last, history) =
                row.map_err(|source| sqlite_error(&path, source))?;

            let key = ItemKey {
                dict_id,
                dict_entry,
                headword: clean_headword(&hw),
                created: created.unwrap_or(0),
            };
            let score = ItemScore {
                reviewed: review_count(&key, reviewed)?,
                first_reviewed: review_time(first),
                last_reviewed: review_time(last),
                history: history_text(&key, history)?,
            };
            snapshot.insert(key, score)?;
        }

        debug!("Read {} cards from {:?}", snapshot.len(), path);
        Ok(snapshot)
    }
}

/// Zero and NULL both mean the card was never reviewed
fn review_time(unix_seconds: Option<i64>) -> Option<DateTime<Utc>> {
    match unix_seconds {
        Some(secs) if secs > 0 => DateTime::<Utc>::from_timestamp(secs, 0),
        _ => None,
    }
}

/// NULL (no score row) means zero reviews
fn review_count(key: &ItemKey, reviewed: Option<i64>) -> Result<u32, IntegrityFault> {
    let value = reviewed.unwrap_or(0);
    u32::try_from(value).map_err(|_| IntegrityFault::InvalidCount {
        key: key.clone(),
        value,
    })
}

fn sqlite_error(path: &Path, source: rusqlite::Error) -> SnapshotError {
    SnapshotError::Sqlite {
        path: path.to_path_buf(),
        source,
    }
}

/// The source marks syllable boundaries in headwords with `@`
fn clean_headword(hw: &str) -> String {
    hw.replace('@', "")
}

/// Outcome digits must come back as text; a numeric value has lost any
/// leading zeros
fn history_text(key: &ItemKey, value: Value) -> Result<String, IntegrityFault> {
    let kind = match value {
        Value::Text(s) => return Ok(s),
        Value::Blob(b) => return Ok(String::from_utf8_lossy(&b).to_string()),
        Value::Null => return Ok(String::new()),
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
    };
    Err(IntegrityFault::UntypedHistory {
        key: key.clone(),
        kind,
    })
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
