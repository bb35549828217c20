//! Per-date report
//!
//! Cumulative columns run from the first recorded review, not from the
//! window start.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::DateRange;
use crate::learning::LearningLedger;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub reviewed: u32,
    /// Subjects reviewed for the first time ever
    pub new: u32,
    pub learned: u32,
    pub forgot: u32,
    pub net_learned: i64,
    /// Reviews whose date is interpolated rather than known
    pub estimated: u32,
    pub cumulative_reviewed: u64,
    pub cumulative_new: u64,
    pub cumulative_net_learned: i64,
}

/// One row per date in `range` with at least one review
pub fn daily_report(ledger: &LearningLedger, range: &DateRange) -> Vec<DailyRow> {
    let mut days: BTreeMap<NaiveDate, DailyRow> = BTreeMap::new();
    for (_, records) in ledger.subjects() {
        for record in records {
            let row = days.entry(record.date).or_insert_with(|| DailyRow {
                date: record.date,
                ..DailyRow::default()
            });
            row.reviewed += 1;
            if record.occurrence == 1 {
                row.new += 1;
            }
            match record.net_learned {
                1 => row.learned += 1,
                -1 => row.forgot += 1,
                _ => {}
            }
            row.net_learned += record.net_learned as i64;
            if !record.exact_date {
                row.estimated += 1;
            }
        }
    }

    let mut reviewed = 0u64;
    let mut new = 0u64;
    let mut net_learned = 0i64;
    let mut rows = Vec::new();
    for (date, mut row) in days {
        reviewed += row.reviewed as u64;
        new += row.new as u64;
        net_learned += row.net_learned;
        row.cumulative_reviewed = reviewed;
        row.cumulative_new = new;
        row.cumulative_net_learned = net_learned;
        if range.contains(date) {
            rows.push(row);
        }
    }
    rows
}
