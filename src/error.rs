//! Error taxonomy for snapshot reconciliation
//!
//! Integrity faults mean the captured data contradicts itself. They halt the
//! run before the offending batch is merged; interpolating over inconsistent
//! bounds would silently produce wrong timestamps.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use crate::snapshot::ItemKey;

/// Data-integrity fault, always tied to the card that triggered it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityFault {
    #[error("review count for {key} went backwards from {previous} to {current}")]
    CounterRegression {
        key: ItemKey,
        previous: u32,
        current: u32,
    },

    #[error("history for {key} holds {available} outcomes but {needed} new reviews were counted")]
    HistoryTooShort {
        key: ItemKey,
        available: usize,
        needed: u32,
    },

    #[error("history for {key} contains invalid outcome code {code:?}")]
    InvalidOutcome { key: ItemKey, code: char },

    #[error("{key} has {count} new reviews but no review times")]
    MissingReviewTimes { key: ItemKey, count: u32 },

    #[error("review window for {key} ends at {end} before it starts at {start}")]
    InvertedWindow {
        key: ItemKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("cannot interpolate {count} reviews for {key} from {outcomes} outcomes")]
    BadInterpolation {
        key: ItemKey,
        count: u32,
        outcomes: usize,
    },

    #[error("batch reviews {key} at {reviewed_at}, before its last logged review at {logged}")]
    OverlappingBatch {
        key: ItemKey,
        reviewed_at: DateTime<Utc>,
        logged: DateTime<Utc>,
    },

    #[error("logged reviews for {key} skip from occurrence {expected} to {found}")]
    BrokenSequence {
        key: ItemKey,
        expected: u32,
        found: u32,
    },

    #[error("{key} appears more than once in the snapshot")]
    DuplicateItem { key: ItemKey },

    #[error("review count for {key} is {value}, outside the valid range")]
    InvalidCount { key: ItemKey, value: i64 },

    #[error("history for {key} is stored as a {kind}, not as outcome text")]
    UntypedHistory { key: ItemKey, kind: &'static str },
}

impl IntegrityFault {
    /// The card the fault was detected on
    pub fn key(&self) -> &ItemKey {
        match self {
            IntegrityFault::CounterRegression { key, .. }
            | IntegrityFault::HistoryTooShort { key, .. }
            | IntegrityFault::InvalidOutcome { key, .. }
            | IntegrityFault::MissingReviewTimes { key, .. }
            | IntegrityFault::InvertedWindow { key, .. }
            | IntegrityFault::BadInterpolation { key, .. }
            | IntegrityFault::OverlappingBatch { key, .. }
            | IntegrityFault::BrokenSequence { key, .. }
            | IntegrityFault::InvalidCount { key, .. }
            | IntegrityFault::UntypedHistory { key, .. }
            | IntegrityFault::DuplicateItem { key } => key,
        }
    }
}

/// An integrity fault located in the snapshot pair whose diff raised it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "snapshot {current:?} (previous: {}) failed integrity check: {fault}",
    previous_label(.previous)
)]
pub struct SnapshotFault {
    pub previous: Option<String>,
    pub current: String,
    #[source]
    pub fault: IntegrityFault,
}

fn previous_label(previous: &Option<String>) -> String {
    match previous {
        Some(folder) => format!("{:?}", folder),
        None => "none".to_string(),
    }
}

/// Failure to produce a snapshot from a capture folder
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The acquisition side never delivered this capture
    #[error("no snapshot database at {0:?}")]
    Missing(PathBuf),

    #[error("snapshot folder {0:?} does not carry a capture time")]
    BadFolderName(String),

    #[error("invalid snapshot setting: {0}")]
    BadSetting(String),

    #[error("could not read snapshot {path:?}: {source}")]
    Sqlite {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Integrity(#[from] IntegrityFault),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
