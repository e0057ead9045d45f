//! Habit streak calculation
//!
//! A streak is a run of consecutive calendar days with a completed check-in.
//! The current streak is anchored at today: without a check-in today it is 0.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

/// Streak counters stored on a habit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct StreakSummary {
    pub current: i64,
    pub longest: i64,
    pub total: i64,
}

/// Count consecutive completed days ending today
///
/// Walks dates newest first and stops at the first gap. Input order and
/// duplicates do not matter.
pub fn current_streak(completed: &[NaiveDate], today: NaiveDate) -> i64 {
    let mut dates = completed.to_vec();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();

    let mut streak = 0;
    for date in dates {
        if date > today {
            continue;
        }
        if date == today - Duration::days(streak) {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

/// Longest run of consecutive days anywhere in the history
pub fn longest_streak(completed: &[NaiveDate]) -> i64 {
    let mut dates = completed.to_vec();
    dates.sort_unstable();
    dates.dedup();

    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for date in dates {
        run = match previous {
            Some(p) if date - p == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(date);
    }
    longest
}

/// Recompute all streak counters from the completed check-in dates
pub fn summarize(completed: &[NaiveDate], today: NaiveDate) -> StreakSummary {
    let mut unique = completed.to_vec();
    unique.sort_unstable();
    unique.dedup();

    StreakSummary {
        current: current_streak(&unique, today),
        longest: longest_streak(&unique),
        total: unique.len() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, n).unwrap()
    }

    #[test]
    fn test_three_consecutive_days() {
        let dates = [day(1), day(2), day(3)];
        assert_eq!(current_streak(&dates, day(3)), 3);
    }

    #[test]
    fn test_missed_day_resets_to_zero() {
        let dates = [day(1), day(2), day(3)];
        // Nothing on the 4th, today is the 5th
        assert_eq!(current_streak(&dates, day(5)), 0);
    }

    #[test]
    fn test_gap_stops_count() {
        let dates = [day(1), day(2), day(4), day(5)];
        assert_eq!(current_streak(&dates, day(5)), 2);
    }

    #[test]
    fn test_unordered_and_duplicate_input() {
        let dates = [day(3), day(1), day(2), day(3)];
        assert_eq!(current_streak(&dates, day(3)), 3);
    }

    #[test]
    fn test_future_dates_ignored() {
        let dates = [day(2), day(3), day(9)];
        assert_eq!(current_streak(&dates, day(3)), 2);
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(current_streak(&[], day(1)), 0);
        assert_eq!(longest_streak(&[]), 0);
    }

    #[test]
    fn test_longest_streak_anywhere() {
        let dates = [day(1), day(2), day(3), day(4), day(10), day(11)];
        assert_eq!(longest_streak(&dates), 4);
    }

    #[test]
    fn test_summarize_counts_unique_days() {
        let dates = [day(10), day(11), day(11), day(1)];
        let summary = summarize(&dates, day(11));
        assert_eq!(
            summary,
            StreakSummary { current: 2, longest: 2, total: 3 }
        );
    }
}
