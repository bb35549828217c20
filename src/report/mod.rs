//! Windowed reports over the learning ledger
//!
//! Read-only projections: `daily` indexes by review date, `words` by
//! subject. Neither mutates the log or the ledger.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use std::fmt;

mod daily;
mod export;
mod words;

pub use daily::{daily_report, DailyRow};
pub use export::write_csv;
pub use words::{words_report, WordRow, WordSummary};

/// Closed-open date window `[start, end)`; an open side is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                anyhow::bail!("End date {} is before start date {}", end, start);
            }
        }
        Ok(Self { start, end })
    }

    /// The `days` calendar days ending with `today`
    pub fn last_days(today: NaiveDate, days: u32) -> Self {
        let end = today + Duration::days(1);
        Self {
            start: Some(end - Duration::days(days.max(1) as i64)),
            end: Some(end),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date < end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (Some(start), Some(end)) => write!(f, "[{}, {})", start, end),
            (Some(start), None) => write!(f, "[{}, ...)", start),
            (None, Some(end)) => write!(f, "[..., {})", end),
            (None, None) => write!(f, "all dates"),
        }
    }
}
