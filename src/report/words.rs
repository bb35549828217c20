//! Per-subject report over a date window
//!
//! For each subject reviewed in the window: how often, whether it was new,
//! whether it was already known going in (`knew`), whether its first state
//! change in the window learned or forgot it, and whether it is known now.

use chrono::NaiveDate;
use serde::Serialize;

use super::DateRange;
use crate::learning::{LearningLedger, LearningRecord, Subject};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordRow {
    pub headword: String,
    pub item: String,
    pub reviewed: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub first_reviewed: NaiveDate,
    pub last_reviewed: NaiveDate,
    pub new: bool,
    pub knew: bool,
    pub learned: bool,
    pub forgot: bool,
    pub know: bool,
}

impl WordRow {
    fn from_window(subject: &Subject, window: &[&LearningRecord]) -> Option<Self> {
        let first = window.first()?;
        let last = window.last()?;
        let correct = window.iter().filter(|r| r.correct).count() as u32;
        let first_change = window.iter().find(|r| r.net_learned != 0).map(|r| r.net_learned);

        let knew = first.previously_learned == Some(true);
        let learned = first_change == Some(1);
        let forgot = first_change == Some(-1);

        Some(Self {
            headword: subject.headword().to_string(),
            item: subject.to_string(),
            reviewed: window.len() as u32,
            correct,
            incorrect: window.len() as u32 - correct,
            first_reviewed: first.date,
            last_reviewed: last.date,
            new: first.occurrence == 1,
            knew,
            learned,
            forgot,
            know: learned || (knew && !forgot),
        })
    }
}

/// Totals over a words report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WordSummary {
    pub reviewed: usize,
    pub new: usize,
    pub learned: usize,
    /// Subjects not known going into the window
    pub learnable: usize,
    pub forgot: usize,
    /// Subjects known going into the window
    pub forgettable: usize,
    /// Not new, not known before and still not known
    pub still_learning: usize,
    /// Known before and still known
    pub retained: usize,
}

impl WordSummary {
    pub fn from_rows(rows: &[WordRow]) -> Self {
        let count = |f: fn(&WordRow) -> bool| rows.iter().filter(|r| f(r)).count();
        Self {
            reviewed: rows.len(),
            new: count(|r| r.new),
            learned: count(|r| r.learned),
            learnable: count(|r| !r.knew),
            forgot: count(|r| r.forgot),
            forgettable: count(|r| r.knew),
            still_learning: count(|r| !r.new && !r.knew && !r.know),
            retained: count(|r| r.knew && r.know),
        }
    }

    /// Learned share of learnable subjects, in percent
    pub fn learned_ratio(&self) -> Option<f64> {
        percent(self.learned, self.learnable)
    }

    /// Forgotten share of forgettable subjects, in percent
    pub fn forgot_ratio(&self) -> Option<f64> {
        percent(self.forgot, self.forgettable)
    }
}

fn percent(part: usize, whole: usize) -> Option<f64> {
    (whole > 0).then(|| part as f64 * 100.0 / whole as f64)
}

/// One row per subject with a review in `range`, ordered by headword
pub fn words_report(ledger: &LearningLedger, range: &DateRange) -> Vec<WordRow> {
    let mut rows: Vec<WordRow> = ledger
        .subjects()
        .filter_map(|(subject, records)| {
            let window: Vec<&LearningRecord> =
                records.iter().filter(|r| range.contains(r.date)).collect();
            WordRow::from_window(subject, &window)
        })
        .collect();
    rows.sort_by(|a, b| a.headword.cmp(&b.headword).then_with(|| a.item.cmp(&b.item)));
    rows
}
