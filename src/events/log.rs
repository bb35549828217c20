//! Event log merger
//!
//! The log is the single source of truth: per card, an append-only sequence
//! of review events numbered densely from 1. Merging is two-phase so a
//! batch is either fully applied or not at all: `prepare` checks the batch
//! and numbers it without touching the log, `apply` appends it.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::{Review, ReviewEvent};
use crate::error::IntegrityFault;
use crate::snapshot::ItemKey;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    items: BTreeMap<ItemKey, Vec<ReviewEvent>>,
}

/// A batch checked against the log, with occurrences assigned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedBatch {
    items: Vec<(ItemKey, Vec<ReviewEvent>)>,
}

impl PreparedBatch {
    /// Number of events in the batch
    pub fn len(&self) -> usize {
        self.items.iter().map(|(_, events)| events.len()).sum()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of cards the batch touches
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemKey, &ReviewEvent)> {
        self.items
            .iter()
            .flat_map(|(key, events)| events.iter().map(move |event| (key, event)))
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from stored events, checking every card's sequence
    pub fn from_events<I>(events: I) -> Result<Self, IntegrityFault>
    where
        I: IntoIterator<Item = (ItemKey, ReviewEvent)>,
    {
        let mut items: BTreeMap<ItemKey, Vec<ReviewEvent>> = BTreeMap::new();
        for (key, event) in events {
            items.entry(key).or_default().push(event);
        }

        for (key, events) in items.iter_mut() {
            events.sort_by_key(|e| e.occurrence);
            let mut logged: Option<DateTime<Utc>> = None;
            for (i, event) in events.iter().enumerate() {
                let expected = i as u32 + 1;
                if event.occurrence != expected {
                    return Err(IntegrityFault::BrokenSequence {
                        key: key.clone(),
                        expected,
                        found: event.occurrence,
                    });
                }
                if let Some(logged) = logged.filter(|&t| event.reviewed_at < t) {
                    return Err(IntegrityFault::OverlappingBatch {
                        key: key.clone(),
                        reviewed_at: event.reviewed_at,
                        logged,
                    });
                }
                logged = Some(event.reviewed_at);
            }
        }

        Ok(Self { items })
    }

    /// Check a batch and number its events, leaving the log untouched
    ///
    /// Occurrences continue from each card's last logged occurrence in the
    /// batch's own order. A review earlier than the card's latest logged
    /// review rejects the whole batch.
    pub fn prepare(&self, batch: Vec<(ItemKey, Vec<Review>)>) -> Result<PreparedBatch, IntegrityFault> {
        let mut cursors: BTreeMap<ItemKey, (u32, Option<DateTime<Utc>>)> = BTreeMap::new();
        let mut prepared = PreparedBatch::default();

        for (key, reviews) in batch {
            if reviews.is_empty() {
                continue;
            }

            let cursor = cursors.entry(key.clone()).or_insert_with(|| {
                let last = self.items.get(&key).and_then(|events| events.last());
                (
                    last.map(|e| e.occurrence).unwrap_or(0),
                    last.map(|e| e.reviewed_at),
                )
            });

            let mut events = Vec::with_capacity(reviews.len());
            for review in reviews {
                if let Some(logged) = cursor.1.filter(|&t| review.reviewed_at < t) {
                    return Err(IntegrityFault::OverlappingBatch {
                        key,
                        reviewed_at: review.reviewed_at,
                        logged,
                    });
                }
                cursor.0 += 1;
                cursor.1 = Some(review.reviewed_at);
                events.push(review.into_event(cursor.0));
            }
            prepared.items.push((key, events));
        }

        Ok(prepared)
    }

    /// Append a batch produced by `prepare` on this log
    pub fn apply(&mut self, batch: &PreparedBatch) {
        for (key, events) in &batch.items {
            self.items
                .entry(key.clone())
                .or_default()
                .extend_from_slice(events);
        }
    }

    /// Prepare and apply in one step
    #[allow(dead_code)]
    pub fn merge(&mut self, batch: Vec<(ItemKey, Vec<Review>)>) -> Result<usize, IntegrityFault> {
        let prepared = self.prepare(batch)?;
        self.apply(&prepared);
        Ok(prepared.len())
    }

    /// Events of one card, in occurrence order
    #[allow(dead_code)]
    pub fn events_for(&self, key: &ItemKey) -> &[ReviewEvent] {
        self.items.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every card with its events, in key order
    pub fn items(&self) -> impl Iterator<Item = (&ItemKey, &[ReviewEvent])> {
        self.items.iter().map(|(key, events)| (key, events.as_slice()))
    }

    #[allow(dead_code)]
    pub fn iter(&self) -> impl Iterator<Item = (&ItemKey, &ReviewEvent)> {
        self.items
            .iter()
            .flat_map(|(key, events)| events.iter().map(move |event| (key, event)))
    }

    /// Total number of events
    pub fn len(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}
