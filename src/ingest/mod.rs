//! Incremental ingest
//!
//! A `Pipeline` owns the event log and the most recent snapshot. Feeding it
//! snapshots in capture order diffs each one against the previous,
//! interpolates the new reviews and merges them into the log. A snapshot
//! either lands completely or not at all.

use tracing::debug;

mod runner;

pub use runner::{ingest_pending, pending_snapshots, RunSummary};

use crate::config::Zone;
use crate::error::{IntegrityFault, SnapshotFault};
use crate::events::{diff_snapshots, EventLog, Interpolator, PreparedBatch};
use crate::snapshot::Snapshot;

/// Result of ingesting one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New review events, numbered and ready to append
    Batch(PreparedBatch),
    /// No card gained reviews since the previous snapshot
    NoNewReviews,
}

impl IngestOutcome {
    pub fn event_count(&self) -> usize {
        match self {
            IngestOutcome::Batch(batch) => batch.len(),
            IngestOutcome::NoNewReviews => 0,
        }
    }

    pub fn batch(&self) -> Option<&PreparedBatch> {
        match self {
            IngestOutcome::Batch(batch) => Some(batch),
            IngestOutcome::NoNewReviews => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    interpolator: Interpolator,
    log: EventLog,
    previous: Option<Snapshot>,
}

impl Pipeline {
    pub fn new(correct_threshold: u8, zone: Zone) -> Self {
        Self::resume(correct_threshold, zone, EventLog::new(), None)
    }

    /// Continue from a persisted log and the last snapshot it was built from
    pub fn resume(
        correct_threshold: u8,
        zone: Zone,
        log: EventLog,
        previous: Option<Snapshot>,
    ) -> Self {
        Self {
            interpolator: Interpolator::new(correct_threshold, zone),
            log,
            previous,
        }
    }

    /// Diff, interpolate and number a snapshot without changing any state
    pub fn prepare(&self, snapshot: &Snapshot) -> Result<IngestOutcome, SnapshotFault> {
        self.build_batch(snapshot).map_err(|fault| self.fault(snapshot, fault))
    }

    fn build_batch(&self, snapshot: &Snapshot) -> Result<IngestOutcome, IntegrityFault> {
        let increments = diff_snapshots(self.previous.as_ref(), snapshot)?;
        if increments.is_empty() {
            return Ok(IngestOutcome::NoNewReviews);
        }

        let mut batch = Vec::with_capacity(increments.len());
        for increment in &increments {
            let reviews = self.interpolator.expand(increment)?;
            batch.push((increment.key.clone(), reviews));
        }

        let prepared = self.log.prepare(batch)?;
        debug!(
            "{}: {} reviews across {} cards",
            snapshot.id,
            prepared.len(),
            prepared.item_count()
        );
        Ok(IngestOutcome::Batch(prepared))
    }

    /// Adopt a prepared snapshot: append its events and make it the new
    /// baseline for the next diff
    pub fn commit(&mut self, snapshot: Snapshot, outcome: &IngestOutcome) {
        if let Some(batch) = outcome.batch() {
            self.log.apply(batch);
        }
        self.previous = Some(snapshot);
    }

    /// Prepare and commit in one step
    #[allow(dead_code)]
    pub fn ingest(&mut self, snapshot: Snapshot) -> Result<IngestOutcome, SnapshotFault> {
        let outcome = self.prepare(&snapshot)?;
        self.commit(snapshot, &outcome);
        Ok(outcome)
    }

    /// Attach the snapshot pair to a fault found in `snapshot`
    pub fn fault(&self, snapshot: &Snapshot, fault: IntegrityFault) -> SnapshotFault {
        SnapshotFault {
            previous: self.previous.as_ref().map(|p| p.id.folder.clone()),
            current: snapshot.id.folder.clone(),
            fault,
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    #[allow(dead_code)]
    pub fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }
}
