//! Ingest run over the snapshot folder
//!
//! Loads persisted state, then reads, checks and commits each pending
//! capture in order. Cancellation is honoured between snapshots only.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use super::Pipeline;
use crate::config::Config;
use crate::error::SnapshotError;
use crate::snapshot::{discover, Snapshot, SnapshotId, SnapshotReader};
use crate::storage::{RunLock, StateStore, LOCK_FILE, STATE_FILE};

/// What one run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub events: usize,
    pub pending: usize,
    pub interrupted: bool,
}

/// Captures newer than the last processed one, oldest first
pub fn pending_snapshots(home: &Path, config: &Config, store: &StateStore) -> Result<Vec<SnapshotId>> {
    let root = config.snapshot_root(home);
    if !root.is_dir() {
        warn!("Snapshot folder {:?} does not exist", root);
        return Ok(Vec::new());
    }

    let mut ids = discover(&root, &config.snapshots)?;
    if let Some(last) = store.last_processed()? {
        ids.retain(|id| id.captured_at > last.captured_at);
    }
    Ok(ids)
}

/// Process pending captures, at most `limit` of them
///
/// An integrity fault stops the run with an error naming the card and the
/// snapshot pair; every snapshot committed before it stays committed.
pub fn ingest_pending(
    home: &Path,
    config: &Config,
    limit: Option<usize>,
    running: &AtomicBool,
) -> Result<RunSummary> {
    let _lock = RunLock::acquire(&home.join(LOCK_FILE))?;
    let mut store = StateStore::open(&home.join(STATE_FILE))?;

    let pending = pending_snapshots(home, config, &store)?;
    let mut summary = RunSummary {
        pending: pending.len(),
        ..RunSummary::default()
    };
    if pending.is_empty() {
        info!("No new snapshots");
        return Ok(summary);
    }

    let mut pipeline = Pipeline::resume(
        config.learning.correct_threshold,
        config.time.timezone,
        store.load_log()?,
        store.load_previous()?,
    );
    let reader = SnapshotReader::new(config.snapshot_root(home), config);

    for id in pending.into_iter().take(limit.unwrap_or(usize::MAX)) {
        if !running.load(Ordering::SeqCst) {
            info!("Interrupted; stopping before {}", id);
            summary.interrupted = true;
            break;
        }

        let started_at = Utc::now();
        let snapshot = match reader.read(&id) {
            Ok(snapshot) => snapshot,
            Err(SnapshotError::Missing(path)) => {
                warn!("Skipping {}: no database at {:?}", id, path);
                summary.skipped += 1;
                continue;
            }
            Err(SnapshotError::Integrity(fault)) => {
                let current = Snapshot::new(id.clone());
                let fault = pipeline.fault(&current, fault);
                error!("Integrity fault on {}: {}", fault.fault.key(), fault);
                return Err(fault.into());
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = match pipeline.prepare(&snapshot) {
            Ok(outcome) => outcome,
            Err(fault) => {
                error!("Integrity fault on {}: {}", fault.fault.key(), fault);
                return Err(fault.into());
            }
        };

        store.commit(&snapshot, &outcome, started_at)?;
        info!(
            "Processed {}: {} cards, {} new reviews",
            id,
            snapshot.len(),
            outcome.event_count()
        );
        summary.processed += 1;
        summary.events += outcome.event_count();
        pipeline.commit(snapshot, &outcome);
    }

    Ok(summary)
}
