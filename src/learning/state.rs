//! Learned/forgotten state machine
//!
//! Walks one subject's reviews in order. A review leaves the subject
//! "learned" when all of these hold:
//!
//! - more correct than incorrect reviews so far (cumulative, up to this review)
//! - more correct than incorrect reviews on this review's date
//! - the first and the last review of that date were correct
//!
//! Day-scoped values cover the whole date, so every review on a date sees
//! the same day totals. `net_learned` is +1 when a review flips the state
//! on, -1 when it flips it off, 0 otherwise; before the first review the
//! state counts as not learned.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::LearningRecord;
use crate::config::Zone;
use crate::events::ReviewEvent;

#[derive(Debug, Clone, Copy, Default)]
struct DayTotals {
    correct: u32,
    incorrect: u32,
    opened_correct: bool,
    closed_correct: bool,
}

fn day_totals(events: &[ReviewEvent], zone: Zone) -> BTreeMap<NaiveDate, DayTotals> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for event in events {
        let date = zone.date_of(event.reviewed_at);
        let first_of_day = !days.contains_key(&date);
        let day = days.entry(date).or_default();
        if event.correct {
            day.correct += 1;
        } else {
            day.incorrect += 1;
        }
        if first_of_day {
            day.opened_correct = event.correct;
        }
        day.closed_correct = event.correct;
    }
    days
}

/// Annotate one subject's reviews, which must be in occurrence order
///
/// Days are calendar dates in `zone`.
pub fn annotate(events: &[ReviewEvent], zone: Zone) -> Vec<LearningRecord> {
    let days = day_totals(events, zone);

    let mut records = Vec::with_capacity(events.len());
    let mut correct_count = 0u32;
    let mut incorrect_count = 0u32;
    let mut previously_learned: Option<bool> = None;

    for event in events {
        if event.correct {
            correct_count += 1;
        } else {
            incorrect_count += 1;
        }

        let date = zone.date_of(event.reviewed_at);
        let day = days.get(&date).copied().unwrap_or_default();

        let learned = correct_count > incorrect_count
            && day.correct > day.incorrect
            && day.opened_correct
            && day.closed_correct;

        let net_learned = match (previously_learned.unwrap_or(false), learned) {
            (false, true) => 1,
            (true, false) => -1,
            _ => 0,
        };

        records.push(LearningRecord {
            occurrence: event.occurrence,
            reviewed_at: event.reviewed_at,
            date,
            correct: event.correct,
            exact_date: event.exact_date,
            correct_count,
            incorrect_count,
            day_correct: day.correct,
            day_incorrect: day.incorrect,
            day_opened_correct: day.opened_correct,
            day_closed_correct: day.closed_correct,
            learned,
            previously_learned,
            net_learned,
        });
        previously_learned = Some(learned);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn events(reviews: &[(&str, bool)]) -> Vec<ReviewEvent> {
        reviews
            .iter()
            .enumerate()
            .map(|(i, (at, correct))| ReviewEvent {
                occurrence: i as u32 + 1,
                reviewed_at: NaiveDateTime::parse_from_str(at, "%Y-%m-%d %H:%M:%S")
                    .unwrap()
                    .and_utc(),
                correct: *correct,
                exact_time: false,
                exact_date: true,
            })
            .collect()
    }

    fn annotate_utc(reviews: &[(&str, bool)]) -> Vec<LearningRecord> {
        annotate(&events(reviews), Zone::Utc)
    }

    #[test]
    fn test_last_review_of_day_incorrect_blocks_learning() {
        let records = annotate_utc(&[
            ("2019-03-01 08:00:00", true),
            ("2019-03-01 09:00:00", true),
            ("2019-03-01 10:00:00", false),
        ]);

        let last = records.last().unwrap();
        assert_eq!((last.day_correct, last.day_incorrect), (2, 1));
        assert!(last.day_opened_correct);
        assert!(!last.day_closed_correct);
        assert!(records.iter().all(|r| !r.learned && r.net_learned == 0));
        assert_eq!((last.correct_count, last.incorrect_count), (2, 1));
    }

    #[test]
    fn test_learn_then_forget() {
        let records = annotate_utc(&[
            ("2019-03-01 08:00:00", true),
            ("2019-03-02 08:00:00", false),
            ("2019-03-03 08:00:00", true),
            ("2019-03-03 09:00:00", true),
        ]);

        let learned: Vec<bool> = records.iter().map(|r| r.learned).collect();
        let net: Vec<i8> = records.iter().map(|r| r.net_learned).collect();
        assert_eq!(learned, vec![true, false, true, true]);
        assert_eq!(net, vec![1, -1, 1, 0]);
        assert_eq!(records[0].previously_learned, None);
        assert_eq!(records[1].previously_learned, Some(true));
    }

    #[test]
    fn test_cumulative_must_be_net_positive() {
        // Two misses, then a clean day: the day is good but the total is not
        let records = annotate_utc(&[
            ("2019-03-01 08:00:00", false),
            ("2019-03-01 09:00:00", false),
            ("2019-03-02 08:00:00", true),
        ]);
        assert!(!records[2].learned);

        let more = annotate_utc(&[
            ("2019-03-01 08:00:00", false),
            ("2019-03-02 08:00:00", true),
            ("2019-03-02 09:00:00", true),
        ]);
        assert!(!more[1].learned);
        assert!(more[2].learned);
        assert_eq!(more[2].net_learned, 1);
    }

    #[test]
    fn test_net_learned_running_sum_matches_state() {
        let pattern = [true, false, true, true, false, false, true, true, true, false, true];
        let reviews: Vec<(String, bool)> = pattern
            .iter()
            .enumerate()
            .map(|(i, c)| (format!("2019-03-{:02} 08:00:00", i / 2 + 1), *c))
            .collect();
        let borrowed: Vec<(&str, bool)> = reviews.iter().map(|(s, c)| (s.as_str(), *c)).collect();
        let records = annotate_utc(&borrowed);

        let mut running = 0i32;
        let mut learned_total = 0i32;
        let mut forgot_total = 0i32;
        for record in &records {
            running += record.net_learned as i32;
            match record.net_learned {
                1 => learned_total += 1,
                -1 => forgot_total += 1,
                _ => {}
            }
            assert_eq!(learned_total - forgot_total, running);
            assert_eq!(running, record.learned as i32);
        }
    }

    #[test]
    fn test_pure_and_repeatable() {
        let input = events(&[("2019-03-01 08:00:00", true), ("2019-03-04 08:00:00", false)]);
        assert_eq!(annotate(&input, Zone::Utc), annotate(&input, Zone::Utc));
        assert!(annotate(&[], Zone::Utc).is_empty());
    }

    #[test]
    fn test_days_follow_zone() {
        // 22:00 on the 1st and 03:00 on the 2nd UTC are both the 1st at -05:00
        let input = events(&[("2019-03-01 22:00:00", true), ("2019-03-02 03:00:00", false)]);

        let utc = annotate(&input, Zone::Utc);
        assert!(utc[0].learned);
        assert_eq!((utc[1].day_correct, utc[1].day_incorrect), (0, 1));

        let west = annotate(&input, "-05:00".parse().unwrap());
        assert!(west.iter().all(|r| r.date.to_string() == "2019-03-01"));
        assert_eq!((west[0].day_correct, west[0].day_incorrect), (1, 1));
        assert!(!west[0].learned);
        assert_eq!(west[0].net_learned, 0);
    }
}
