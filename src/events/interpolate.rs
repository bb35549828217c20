//! Event interpolator
//!
//! The source records only when a card was first and last reviewed, so the
//! individual reviews of an increment are spread linearly over its window.
//! Review `i` of `n` lands at `start + (end - start) * (i + 1) / n`; the last
//! one is exactly at `end`, which is the only true timestamp available.

use chrono::{DateTime, Duration, Utc};

use super::{Increment, Review};
use crate::config::Zone;
use crate::error::IntegrityFault;
use crate::snapshot::ItemKey;

/// Highest outcome code on the source's quality scale
const MAX_OUTCOME: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct Interpolator {
    correct_threshold: u8,
    /// Decides whether a window stays within one calendar date
    zone: Zone,
}

impl Interpolator {
    pub fn new(correct_threshold: u8, zone: Zone) -> Self {
        Self {
            correct_threshold,
            zone,
        }
    }

    pub fn expand(&self, increment: &Increment) -> Result<Vec<Review>, IntegrityFault> {
        self.interpolate(
            &increment.key,
            increment.start,
            increment.end,
            increment.count,
            &increment.outcomes,
        )
    }

    /// Produce exactly `count` reviews with non-decreasing timestamps in
    /// `[start, end]`
    ///
    /// Integer millisecond arithmetic keeps reruns bit-identical.
    pub fn interpolate(
        &self,
        key: &ItemKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count: u32,
        outcomes: &str,
    ) -> Result<Vec<Review>, IntegrityFault> {
        let codes: Vec<char> = outcomes.chars().collect();
        if count == 0 || codes.len() != count as usize {
            return Err(IntegrityFault::BadInterpolation {
                key: key.clone(),
                count,
                outcomes: codes.len(),
            });
        }
        if end < start {
            return Err(IntegrityFault::InvertedWindow {
                key: key.clone(),
                start,
                end,
            });
        }

        let span_ms = (end - start).num_milliseconds() as i128;
        let n = count as i128;
        let same_date = self.zone.date_of(start) == self.zone.date_of(end);

        let mut reviews = Vec::with_capacity(codes.len());
        for (i, code) in codes.iter().enumerate() {
            let last = i + 1 == codes.len();
            let reviewed_at = if last {
                end
            } else {
                let offset = span_ms * (i as i128 + 1) / n;
                start + Duration::milliseconds(offset as i64)
            };

            reviews.push(Review {
                reviewed_at,
                correct: self.is_correct(key, *code)?,
                exact_time: last,
                exact_date: last || same_date,
            });
        }

        Ok(reviews)
    }

    fn is_correct(&self, key: &ItemKey, code: char) -> Result<bool, IntegrityFault> {
        match code.to_digit(10) {
            Some(value) if value <= MAX_OUTCOME => Ok(value >= self.correct_threshold as u32),
            _ => Err(IntegrityFault::InvalidOutcome {
                key: key.clone(),
                code,
            }),
        }
    }
}
