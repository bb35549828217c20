//! Review event reconstruction
//!
//! The source only exposes cumulative counters per card. This module turns
//! successive snapshots into individual review events:
//!
//! - `diff` works out which reviews are new since the previous snapshot
//! - `interpolate` spreads them over the window they must have happened in
//! - `log` merges each batch into the append-only event log
//!
//! Review times are UTC instants from end to end. A zone only comes in when
//! a calendar date is needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod diff;
pub mod interpolate;
pub mod log;

pub use diff::{diff_snapshots, Increment};
pub use interpolate::Interpolator;
pub use log::{EventLog, PreparedBatch};

/// An interpolated review, not yet numbered within its card's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub reviewed_at: DateTime<Utc>,
    pub correct: bool,
    /// The timestamp is a real source timestamp, not an estimate
    pub exact_time: bool,
    /// The calendar date is certain even if the time is estimated
    pub exact_date: bool,
}

impl Review {
    pub fn into_event(self, occurrence: u32) -> ReviewEvent {
        ReviewEvent {
            occurrence,
            reviewed_at: self.reviewed_at,
            correct: self.correct,
            exact_time: self.exact_time,
            exact_date: self.exact_date,
        }
    }
}

/// One logged review of a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEvent {
    /// 1-based ordinal among all reviews of the card
    pub occurrence: u32,
    pub reviewed_at: DateTime<Utc>,
    pub correct: bool,
    pub exact_time: bool,
    pub exact_date: bool,
}
