//! Habits and daily check-ins
//!
//! Streak counters on a habit are derived from its completed check-ins and
//! rewritten after every check-in or cancellation.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use lifehub_common::streak::{self, StreakSummary};
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page};

const SELECT: &str = "h.id, h.name, h.description, h.target_days, h.reminder_enabled, h.reminder_time,
    h.is_active, h.current_streak, h.longest_streak, h.total_days, h.creator_id, h.created_at";
const FROM: &str = "habits h";

const ORDERING: &[(&str, &str)] = &[
    ("created_at", "h.created_at"),
    ("name", "h.name"),
    ("current_streak", "h.current_streak"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HabitRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub target_days: i64,
    pub reminder_enabled: bool,
    pub reminder_time: NaiveTime,
    pub is_active: bool,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_days: i64,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HabitRecordRow {
    pub id: String,
    #[serde(rename = "habit")]
    pub habit_id: String,
    pub date: NaiveDate,
    pub completed: bool,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct HabitFields {
    pub name: String,
    pub description: String,
    pub target_days: i64,
    pub reminder_enabled: bool,
    pub reminder_time: NaiveTime,
    pub is_active: bool,
}

pub async fn list(db: &SqlitePool, user_id: &str, is_active: Option<bool>, params: &ListParams) -> ApiResult<Page<HabitRow>> {
    let mut c = Conditions::new();
    c.eq("h.creator_id", Some(user_id))
        .eq("h.is_active", is_active)
        .search(&["h.name", "h.description"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), ORDERING, "h.created_at DESC")?;
    pagination::paginate(db, SELECT, FROM, &c, &order, params).await
}

pub async fn active(db: &SqlitePool, user_id: &str) -> ApiResult<Vec<HabitRow>> {
    let mut c = Conditions::new();
    c.eq("h.creator_id", Some(user_id)).eq("h.is_active", Some(true));
    pagination::fetch_all(db, SELECT, FROM, &c, "h.created_at DESC").await
}

pub async fn get(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<HabitRow> {
    sqlx::query_as(&format!("SELECT {} FROM {} WHERE h.id = ? AND h.creator_id = ?", SELECT, FROM))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Habit"))
}

pub async fn create(db: &SqlitePool, user_id: &str, fields: HabitFields) -> ApiResult<HabitRow> {
    let id = uuid_utils::generate();
    sqlx::query(
        "INSERT INTO habits (id, name, description, target_days, reminder_enabled, reminder_time, is_active,
            creator_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.target_days)
    .bind(fields.reminder_enabled)
    .bind(fields.reminder_time)
    .bind(fields.is_active)
    .bind(user_id)
    .bind(time::now())
    .execute(db)
    .await?;

    get(db, &id, user_id).await
}

pub async fn update(db: &SqlitePool, id: &str, user_id: &str, fields: HabitFields) -> ApiResult<HabitRow> {
    sqlx::query(
        "UPDATE habits SET name = ?, description = ?, target_days = ?, reminder_enabled = ?, reminder_time = ?,
            is_active = ?
         WHERE id = ? AND creator_id = ?",
    )
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.target_days)
    .bind(fields.reminder_enabled)
    .bind(fields.reminder_time)
    .bind(fields.is_active)
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    get(db, id, user_id).await
}

const RECORD_SELECT: &str = "SELECT id, habit_id, date, completed, notes, created_at FROM habit_records";

/// Check-ins of a habit, newest first, optionally bounded (inclusive)
pub async fn records(
    db: &SqlitePool,
    habit_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> ApiResult<Vec<HabitRecordRow>> {
    Ok(sqlx::query_as(&format!(
        "{} WHERE habit_id = ? AND (? IS NULL OR date >= ?) AND (? IS NULL OR date <= ?) ORDER BY date DESC",
        RECORD_SELECT
    ))
    .bind(habit_id)
    .bind(start)
    .bind(start)
    .bind(end)
    .bind(end)
    .fetch_all(db)
    .await?)
}

pub async fn record_on(db: &SqlitePool, habit_id: &str, date: NaiveDate) -> ApiResult<Option<HabitRecordRow>> {
    Ok(sqlx::query_as(&format!("{} WHERE habit_id = ? AND date = ?", RECORD_SELECT))
        .bind(habit_id)
        .bind(date)
        .fetch_optional(db)
        .await?)
}

/// Mark a day completed; returns whether a new record was created
///
/// An existing record for the day is marked completed again and takes the
/// new notes.
pub async fn check_in(db: &SqlitePool, habit_id: &str, date: NaiveDate, notes: &str) -> ApiResult<bool> {
    let existed = record_on(db, habit_id, date).await?.is_some();
    sqlx::query(
        "INSERT INTO habit_records (id, habit_id, date, completed, notes, created_at)
         VALUES (?, ?, ?, 1, ?, ?)
         ON CONFLICT (habit_id, date) DO UPDATE SET completed = 1, notes = excluded.notes",
    )
    .bind(uuid_utils::generate())
    .bind(habit_id)
    .bind(date)
    .bind(notes)
    .bind(time::now())
    .execute(db)
    .await?;
    Ok(!existed)
}

/// Returns false when there was nothing to cancel
pub async fn cancel_check_in(db: &SqlitePool, habit_id: &str, date: NaiveDate) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM habit_records WHERE habit_id = ? AND date = ?")
        .bind(habit_id)
        .bind(date)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn completed_dates(db: &SqlitePool, habit_id: &str) -> ApiResult<Vec<NaiveDate>> {
    Ok(
        sqlx::query_scalar("SELECT date FROM habit_records WHERE habit_id = ? AND completed = 1 ORDER BY date")
            .bind(habit_id)
            .fetch_all(db)
            .await?,
    )
}

/// Recompute and store the streak counters of a habit
pub async fn refresh_streaks(db: &SqlitePool, habit_id: &str) -> ApiResult<StreakSummary> {
    let dates = completed_dates(db, habit_id).await?;
    let summary = streak::summarize(&dates, time::today());
    sqlx::query("UPDATE habits SET current_streak = ?, longest_streak = ?, total_days = ? WHERE id = ?")
        .bind(summary.current)
        .bind(summary.longest)
        .bind(summary.total)
        .bind(habit_id)
        .execute(db)
        .await?;
    Ok(summary)
}
