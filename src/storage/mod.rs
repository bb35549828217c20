//! Persistent pipeline state
//!
//! `state.sqlite` holds the merged event log, the scores of the last
//! processed snapshot (the baseline for the next diff) and a row per
//! processed snapshot. Each snapshot is committed in one transaction, so a
//! reload only ever sees whole snapshots.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

mod lock;

pub use lock::RunLock;

use crate::events::{EventLog, ReviewEvent};
use crate::ingest::IngestOutcome;
use crate::snapshot::{ItemKey, ItemScore, Snapshot, SnapshotId};

pub const STATE_FILE: &str = "state.sqlite";
pub const LOCK_FILE: &str = "ingest.lock";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS review_events (
        dict_id INTEGER NOT NULL,
        dict_entry INTEGER NOT NULL,
        headword TEXT NOT NULL,
        created INTEGER NOT NULL,
        occurrence INTEGER NOT NULL,
        -- UTC, milliseconds since the epoch
        reviewed_at INTEGER NOT NULL,
        correct INTEGER NOT NULL,
        exact_time INTEGER NOT NULL,
        exact_date INTEGER NOT NULL,
        snapshot TEXT NOT NULL,
        PRIMARY KEY (dict_id, dict_entry, headword, created, occurrence)
    );

    CREATE TABLE IF NOT EXISTS last_scores (
        dict_id INTEGER NOT NULL,
        dict_entry INTEGER NOT NULL,
        headword TEXT NOT NULL,
        created INTEGER NOT NULL,
        reviewed INTEGER NOT NULL,
        first_reviewed INTEGER,
        last_reviewed INTEGER,
        history TEXT NOT NULL,
        PRIMARY KEY (dict_id, dict_entry, headword, created)
    );

    CREATE TABLE IF NOT EXISTS processed_snapshots (
        folder TEXT PRIMARY KEY,
        captured_at INTEGER NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        items INTEGER NOT NULL,
        events INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_events_headword ON review_events(headword);
    CREATE INDEX IF NOT EXISTS idx_processed_captured ON processed_snapshots(captured_at);
"#;

/// One row of the processing log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedSnapshot {
    pub folder: String,
    pub captured_at: NaiveDateTime,
    pub started_at: String,
    pub finished_at: String,
    pub items: u64,
    pub events: u64,
}

/// Row counts for `status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub snapshots: u64,
    pub events: u64,
    pub items: u64,
    pub latest: Option<ProcessedSnapshot>,
}

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open or create the state database, ensuring the schema exists
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open state database {:?}", db_path))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Load the whole event log, checking each card's sequence
    pub fn load_log(&self) -> Result<EventLog> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT dict_id, dict_entry, headword, created,
                   occurrence, reviewed_at, correct, exact_time, exact_date
            FROM review_events
            ORDER BY dict_id, dict_entry, headword, created, occurrence
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                ItemKey {
                    dict_id: row.get(0)?,
                    dict_entry: row.get(1)?,
                    headword: row.get(2)?,
                    created: row.get(3)?,
                },
                row.get::<_, u32>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, bool>(6)?,
                row.get::<_, bool>(7)?,
                row.get::<_, bool>(8)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (key, occurrence, reviewed_at, correct, exact_time, exact_date) = row?;
            events.push((
                key,
                ReviewEvent {
                    occurrence,
                    reviewed_at: from_millis(reviewed_at)?,
                    correct,
                    exact_time,
                    exact_date,
                },
            ));
        }

        let log = EventLog::from_events(events).context("Stored event log is inconsistent")?;
        debug!("Loaded {} events for {} cards", log.len(), log.item_count());
        Ok(log)
    }

    /// The most recently processed snapshot, rebuilt from `last_scores`
    pub fn load_previous(&self) -> Result<Option<Snapshot>> {
        let Some(latest) = self.last_processed()? else {
            return Ok(None);
        };

        let mut snapshot = Snapshot::new(SnapshotId {
            captured_at: latest.captured_at,
            folder: latest.folder,
        });

        let mut stmt = self.conn.prepare(
            r#"
            SELECT dict_id, dict_entry, headword, created,
                   reviewed, first_reviewed, last_reviewed, history
            FROM last_scores
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                ItemKey {
                    dict_id: row.get(0)?,
                    dict_entry: row.get(1)?,
                    headword: row.get(2)?,
                    created: row.get(3)?,
                },
                row.get::<_, u32>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        for row in rows {
            let (key, reviewed, first, last, history) = row?;
            let score = ItemScore {
                reviewed,
                first_reviewed: first.map(from_millis).transpose()?,
                last_reviewed: last.map(from_millis).transpose()?,
                history,
            };
            snapshot.insert(key, score)?;
        }

        Ok(Some(snapshot))
    }

    pub fn last_processed(&self) -> Result<Option<ProcessedSnapshot>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT folder, captured_at, started_at, finished_at, items, events
                FROM processed_snapshots
                ORDER BY captured_at DESC
                LIMIT 1
                "#,
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(folder, captured_at, started_at, finished_at, items, events)| -> Result<_> {
            Ok(ProcessedSnapshot {
                folder,
                captured_at: from_millis(captured_at)?.naive_utc(),
                started_at,
                finished_at,
                items: items as u64,
                events: events as u64,
            })
        })
        .transpose()
    }

    /// Persist one snapshot atomically: its events, its scores as the new
    /// baseline and its processing-log row
    pub fn commit(
        &mut self,
        snapshot: &Snapshot,
        outcome: &IngestOutcome,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            if let Some(batch) = outcome.batch() {
                let mut stmt = tx.prepare_cached(
                    r#"
                    INSERT INTO review_events
                    (dict_id, dict_entry, headword, created, occurrence,
                     reviewed_at, correct, exact_time, exact_date, snapshot)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )?;
                for (key, event) in batch.iter() {
                    stmt.execute(params![
                        key.dict_id,
                        key.dict_entry,
                        key.headword,
                        key.created,
                        event.occurrence,
                        to_millis(event.reviewed_at),
                        event.correct,
                        event.exact_time,
                        event.exact_date,
                        snapshot.id.folder,
                    ])?;
                }
            }

            tx.execute("DELETE FROM last_scores", [])?;
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO last_scores
                (dict_id, dict_entry, headword, created,
                 reviewed, first_reviewed, last_reviewed, history)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for (key, score) in snapshot.items() {
                stmt.execute(params![
                    key.dict_id,
                    key.dict_entry,
                    key.headword,
                    key.created,
                    score.reviewed,
                    score.first_reviewed.map(to_millis),
                    score.last_reviewed.map(to_millis),
                    score.history,
                ])?;
            }

            tx.execute(
                r#"
                INSERT INTO processed_snapshots
                (folder, captured_at, started_at, finished_at, items, events)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    snapshot.id.folder,
                    to_millis(snapshot.id.captured_at.and_utc()),
                    rfc3339(started_at),
                    rfc3339(Utc::now()),
                    snapshot.len() as i64,
                    outcome.event_count() as i64,
                ],
            )?;
        }
        tx.commit()
            .with_context(|| format!("Failed to commit snapshot {}", snapshot.id))?;
        Ok(())
    }

    /// Forget everything; the next ingest starts from the first snapshot
    pub fn reset(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM review_events", [])?;
        tx.execute("DELETE FROM last_scores", [])?;
        tx.execute("DELETE FROM processed_snapshots", [])?;
        tx.commit()?;
        info!("Cleared pipeline state");
        Ok(())
    }

    pub fn counts(&self) -> Result<StateCounts> {
        let count = |sql: &str| -> Result<u64> {
            Ok(self.conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as u64)
        };
        Ok(StateCounts {
            snapshots: count("SELECT COUNT(*) FROM processed_snapshots")?,
            events: count("SELECT COUNT(*) FROM review_events")?,
            items: count(
                "SELECT COUNT(*) FROM (SELECT DISTINCT dict_id, dict_entry, headword, created FROM review_events)",
            )?,
            latest: self.last_processed()?,
        })
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow::anyhow!("Stored timestamp {} is out of range", ms))
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Zone;
    use crate::ingest::Pipeline;
    use tempfile::TempDir;

    fn key(dict_entry: i64, headword: &str) -> ItemKey {
        ItemKey {
            dict_id: 1,
            dict_entry,
            headword: headword.to_string(),
            created: 1_500_000_000,
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap().and_utc()
    }

    fn snapshot(folder: &str, reviewed: u32, last: &str, history: &str) -> Snapshot {
        let mut snapshot = Snapshot::new(SnapshotId::parse(folder, "%Y-%m-%d %H.%M.%S").unwrap());
        snapshot
            .insert(
                key(1, "书"),
                ItemScore {
                    reviewed,
                    first_reviewed: Some(at("2019-01-01 08:00:00")),
                    last_reviewed: Some(at(last)),
                    history: history.to_string(),
                },
            )
            .unwrap();
        snapshot
            .insert(key(2, "人"), ItemScore::default())
            .unwrap();
        snapshot
    }

    #[test]
    fn test_commit_and_reload() {
        let temp = TempDir::new().unwrap();
        let mut store = StateStore::open(&temp.path().join(STATE_FILE)).unwrap();
        assert!(store.load_previous().unwrap().is_none());

        let mut pipeline = Pipeline::new(4, Zone::Utc);
        let first = snapshot("2019-01-02 00.00.00", 3, "2019-01-01 20:00:00", "453");
        let outcome = pipeline.prepare(&first).unwrap();
        store.commit(&first, &outcome, Utc::now()).unwrap();
        pipeline.commit(first.clone(), &outcome);

        drop(store);
        let store = StateStore::open(&temp.path().join(STATE_FILE)).unwrap();
        assert_eq!(&store.load_log().unwrap(), pipeline.log());
        assert_eq!(store.load_previous().unwrap(), Some(first));

        let counts = store.counts().unwrap();
        assert_eq!(counts.snapshots, 1);
        assert_eq!(counts.events, 3);
        assert_eq!(counts.items, 1);
        let latest = counts.latest.unwrap();
        assert_eq!(latest.folder, "2019-01-02 00.00.00");
        assert_eq!(latest.items, 2);
        assert_eq!(latest.events, 3);
        assert!(latest.finished_at.ends_with('Z'));
    }

    #[test]
    fn test_latest_snapshot_becomes_baseline() {
        let temp = TempDir::new().unwrap();
        let mut store = StateStore::open(&temp.path().join(STATE_FILE)).unwrap();
        let mut pipeline = Pipeline::new(4, Zone::Utc);

        for (folder, reviewed, last, history) in [
            ("2019-01-02 00.00.00", 1, "2019-01-01 08:00:00", "5"),
            ("2019-01-04 00.00.00", 2, "2019-01-03 08:00:00", "51"),
        ] {
            let snap = snapshot(folder, reviewed, last, history);
            let outcome = pipeline.prepare(&snap).unwrap();
            store.commit(&snap, &outcome, Utc::now()).unwrap();
            pipeline.commit(snap, &outcome);
        }

        let previous = store.load_previous().unwrap().unwrap();
        assert_eq!(previous.id.folder, "2019-01-04 00.00.00");
        assert_eq!(previous.get(&key(1, "书")).unwrap().reviewed, 2);
        assert_eq!(store.load_log().unwrap().events_for(&key(1, "书")).len(), 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let temp = TempDir::new().unwrap();
        let mut store = StateStore::open(&temp.path().join(STATE_FILE)).unwrap();
        let snap = snapshot("2019-01-02 00.00.00", 1, "2019-01-01 08:00:00", "5");
        let outcome = Pipeline::new(4, Zone::Utc).prepare(&snap).unwrap();
        store.commit(&snap, &outcome, Utc::now()).unwrap();

        store.reset().unwrap();
        assert_eq!(store.counts().unwrap(), StateCounts::default());
        assert!(store.load_log().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_commit_rolls_back() {
        let temp = TempDir::new().unwrap();
        let mut store = StateStore::open(&temp.path().join(STATE_FILE)).unwrap();
        let snap = snapshot("2019-01-02 00.00.00", 1, "2019-01-01 08:00:00", "5");
        let outcome = Pipeline::new(4, Zone::Utc).prepare(&snap).unwrap();
        store.commit(&snap, &outcome, Utc::now()).unwrap();

        // Same events again violate the primary key; nothing may be half-written
        assert!(store.commit(&snap, &outcome, Utc::now()).is_err());
        let counts = store.counts().unwrap();
        assert_eq!(counts.snapshots, 1);
        assert_eq!(counts.events, 1);
    }

    #[test]
    fn test_millis_round_trip() {
        let t = at("2019-01-29 22:00:00") + chrono::Duration::milliseconds(333);
        assert_eq!(from_millis(to_millis(t)).unwrap(), t);
    }
}
