//! Learning-state aggregation
//!
//! Derives, per subject, the running correctness counters and the
//! learned/forgotten state for every logged review. Everything here is a
//! pure function of the event log; nothing reads the wall clock.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

mod state;

pub use state::annotate;

use crate::config::Zone;
use crate::events::{EventLog, ReviewEvent};
use crate::snapshot::ItemKey;

/// What a review sequence is keyed by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// One sequence per flashcard
    #[default]
    Card,
    /// Cards sharing a headword are merged into one sequence
    Headword,
}

/// The unit whose learning state is tracked
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subject {
    Card(ItemKey),
    Headword(String),
}

impl Subject {
    pub fn headword(&self) -> &str {
        match self {
            Subject::Card(key) => &key.headword,
            Subject::Headword(headword) => headword,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Card(key) => write!(f, "{}", key),
            Subject::Headword(headword) => f.write_str(headword),
        }
    }
}

/// A review with the learning state derived up to and including it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearningRecord {
    pub occurrence: u32,
    pub reviewed_at: DateTime<Utc>,
    /// Calendar date of the review in the configured zone
    pub date: NaiveDate,
    pub correct: bool,
    pub exact_date: bool,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub day_correct: u32,
    pub day_incorrect: u32,
    /// First review of the date was correct
    pub day_opened_correct: bool,
    /// Last review of the date was correct
    pub day_closed_correct: bool,
    pub learned: bool,
    /// State after the previous review; `None` on the first one
    pub previously_learned: Option<bool>,
    pub net_learned: i8,
}

/// Learning records for every subject of a log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningLedger {
    subjects: BTreeMap<Subject, Vec<LearningRecord>>,
}

impl LearningLedger {
    pub fn build(log: &EventLog, grouping: Grouping, zone: Zone) -> Self {
        let subjects = match grouping {
            Grouping::Card => log
                .items()
                .map(|(key, events)| (Subject::Card(key.clone()), annotate(events, zone)))
                .collect(),
            Grouping::Headword => by_headword(log)
                .into_iter()
                .map(|(headword, events)| (Subject::Headword(headword), annotate(&events, zone)))
                .collect(),
        };
        Self { subjects }
    }

    pub fn subjects(&self) -> impl Iterator<Item = (&Subject, &[LearningRecord])> {
        self.subjects
            .iter()
            .map(|(subject, records)| (subject, records.as_slice()))
    }

    /// Subjects whose headword matches exactly
    pub fn find_headword<'a>(
        &'a self,
        headword: &'a str,
    ) -> impl Iterator<Item = (&'a Subject, &'a [LearningRecord])> + 'a {
        self.subjects().filter(move |(subject, _)| subject.headword() == headword)
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

/// Merge cards sharing a headword into one sequence, renumbered densely
///
/// Order is by timestamp, an incorrect review first on ties, and the
/// cards' own order after that.
fn by_headword(log: &EventLog) -> BTreeMap<String, Vec<ReviewEvent>> {
    let mut merged: BTreeMap<String, Vec<ReviewEvent>> = BTreeMap::new();
    for (key, events) in log.items() {
        merged
            .entry(key.headword.clone())
            .or_default()
            .extend_from_slice(events);
    }

    for events in merged.values_mut() {
        events.sort_by_key(|e| (e.reviewed_at, e.correct));
        for (i, event) in events.iter_mut().enumerate() {
            event.occurrence = i as u32 + 1;
        }
    }
    merged
}
