//! Derived figures recomputed whenever a record is saved

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::TaskStatus;

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Share of `done` in `total` as a percentage with one decimal, 0 when empty
pub fn completion_rate(done: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round1(done as f64 / total as f64 * 100.0)
}

/// Task completion from its children, or its own status for a leaf task
pub fn task_completion_rate(children: i64, children_completed: i64, status: TaskStatus) -> f64 {
    if children == 0 {
        return if status == TaskStatus::Completed { 100.0 } else { 0.0 };
    }
    completion_rate(children_completed, children)
}

/// A task is overdue when its due date has passed and it is not completed
pub fn is_overdue(due: Option<DateTime<Utc>>, status: TaskStatus, now: DateTime<Utc>) -> bool {
    match due {
        Some(due) => status != TaskStatus::Completed && due < now,
        None => false,
    }
}

/// Budget usage `spent / amount * 100`; stays 0 for a non-positive amount
pub fn budget_percentage(spent: f64, amount: f64) -> f64 {
    if amount > 0.0 {
        spent / amount * 100.0
    } else {
        0.0
    }
}

/// Daily efficiency score out of 100
///
/// Half the score is focus time capped at eight hours, the other half is the
/// share of planned tasks completed. `None` when nothing was planned.
pub fn efficiency_score(focus_hours: f64, tasks_completed: i64, tasks_planned: i64) -> Option<f64> {
    if tasks_planned <= 0 {
        return None;
    }
    let time_score = (focus_hours / 8.0).min(1.0) * 50.0;
    let task_score = tasks_completed as f64 / tasks_planned as f64 * 50.0;
    Some(time_score + task_score)
}

/// Whole minutes between two instants, `None` when either end is missing
pub fn duration_minutes(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Option<i64> {
    end.map(|end| (end - start).num_seconds() / 60)
}

/// An item is expired once its expiry date is before today
pub fn is_expired(expiry: Option<NaiveDate>, today: NaiveDate) -> bool {
    expiry.map(|d| d < today).unwrap_or(false)
}
