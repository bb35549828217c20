//! Snapshot differ
//!
//! Works out, per card, how many reviews happened between two snapshots,
//! which outcome digits belong to them, and the time window they fall in.

use chrono::{DateTime, Utc};

use crate::error::IntegrityFault;
use crate::snapshot::{ItemKey, ItemScore, Snapshot};

/// Reviews a card gained since the previous snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub key: ItemKey,
    pub count: u32,
    /// Trailing `count` outcome digits of the current history
    pub outcomes: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Diff one card. `Ok(None)` means no new reviews.
///
/// Without a previous score the whole current score is the increment. The
/// window starts at the later of the current first review and the previous
/// last review, so a review already logged is never emitted again.
pub fn diff_item(
    key: &ItemKey,
    previous: Option<&ItemScore>,
    current: &ItemScore,
) -> Result<Option<Increment>, IntegrityFault> {
    let previous_count = previous.map(|p| p.reviewed).unwrap_or(0);
    if current.reviewed < previous_count {
        return Err(IntegrityFault::CounterRegression {
            key: key.clone(),
            previous: previous_count,
            current: current.reviewed,
        });
    }

    let count = current.reviewed - previous_count;
    if count == 0 {
        return Ok(None);
    }

    let available = current.history.chars().count();
    if available < count as usize {
        return Err(IntegrityFault::HistoryTooShort {
            key: key.clone(),
            available,
            needed: count,
        });
    }
    let outcomes: String = current.history.chars().skip(available - count as usize).collect();

    let (first, end) = match (current.first_reviewed, current.last_reviewed) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(IntegrityFault::MissingReviewTimes {
                key: key.clone(),
                count,
            })
        }
    };

    let start = match previous.and_then(|p| p.last_reviewed) {
        Some(logged) => first.max(logged),
        None => first,
    };
    if end < start {
        return Err(IntegrityFault::InvertedWindow {
            key: key.clone(),
            start,
            end,
        });
    }

    Ok(Some(Increment {
        key: key.clone(),
        count,
        outcomes,
        start,
        end,
    }))
}

/// Diff every card of `current` against `previous`, in key order
///
/// Cards missing from `previous` (new cards, or the very first snapshot) are
/// bootstrapped from their full history. Cards that vanished are ignored.
pub fn diff_snapshots(
    previous: Option<&Snapshot>,
    current: &Snapshot,
) -> Result<Vec<Increment>, IntegrityFault> {
    let mut increments = Vec::new();
    for (key, score) in current.items() {
        let prior = previous.and_then(|p| p.get(key));
        if let Some(increment) = diff_item(key, prior, score)? {
            increments.push(increment);
        }
    }
    Ok(increments)
}
