//! Time records, pomodoro sessions and daily efficiency records
//!
//! All three tables are owned through `user_id`. Derived columns
//! (`duration_minutes`, `efficiency_score`) are recomputed on every write.

use chrono::{DateTime, NaiveDate, Utc};
use lifehub_common::formulas::{duration_minutes, efficiency_score};
use lifehub_common::models::SessionType;
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page};

fn owned(column: &str, user_id: &str) -> Conditions {
    let mut c = Conditions::new();
    c.eq(column, Some(user_id));
    c
}

// ========================================
// Time records
// ========================================

const RECORD_SELECT: &str = "r.id, r.user_id, r.task_id, t.title AS task_title, r.description,
    r.start_time, r.end_time, r.duration_minutes, r.created_at";
const RECORD_FROM: &str = "time_records r LEFT JOIN tasks t ON t.id = r.task_id";

const RECORD_ORDERING: &[(&str, &str)] = &[
    ("start_time", "r.start_time"),
    ("duration_minutes", "r.duration_minutes"),
    ("created_at", "r.created_at"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TimeRecordRow {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    #[serde(rename = "task")]
    pub task_id: Option<String>,
    pub task_title: Option<String>,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TimeRecordFields {
    pub task_id: Option<String>,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

pub async fn list_records(
    db: &SqlitePool,
    user_id: &str,
    task: Option<String>,
    params: &ListParams,
) -> ApiResult<Page<TimeRecordRow>> {
    let mut c = owned("r.user_id", user_id);
    c.eq("r.task_id", task).search(&["r.description"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), RECORD_ORDERING, "r.start_time DESC")?;
    pagination::paginate(db, RECORD_SELECT, RECORD_FROM, &c, &order, params).await
}

pub async fn get_record(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<TimeRecordRow> {
    let mut c = owned("r.user_id", user_id);
    c.eq("r.id", Some(id));
    pagination::fetch_all::<TimeRecordRow>(db, RECORD_SELECT, RECORD_FROM, &c, "r.id")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Time record"))
}

pub async fn create_record(db: &SqlitePool, user_id: &str, fields: TimeRecordFields) -> ApiResult<TimeRecordRow> {
    let id = uuid_utils::generate();
    sqlx::query(
        "INSERT INTO time_records (id, user_id, task_id, description, start_time, end_time, duration_minutes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(&fields.task_id)
    .bind(&fields.description)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(duration_minutes(fields.start_time, fields.end_time))
    .bind(time::now())
    .execute(db)
    .await?;

    get_record(db, &id, user_id).await
}

pub async fn update_record(
    db: &SqlitePool,
    id: &str,
    user_id: &str,
    fields: TimeRecordFields,
) -> ApiResult<TimeRecordRow> {
    sqlx::query(
        "UPDATE time_records SET task_id = ?, description = ?, start_time = ?, end_time = ?, duration_minutes = ?
         WHERE id = ? AND user_id = ?",
    )
    .bind(&fields.task_id)
    .bind(&fields.description)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(duration_minutes(fields.start_time, fields.end_time))
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    get_record(db, id, user_id).await
}

// ========================================
// Pomodoro sessions
// ========================================

const POMODORO_SELECT: &str = "p.id, p.user_id, p.task_id, p.work_duration, p.break_duration,
    p.long_break_duration, p.sessions_completed, p.current_session_type, p.start_time, p.end_time,
    p.is_active, p.created_at";
const POMODORO_FROM: &str = "pomodoro_sessions p";

const POMODORO_ORDERING: &[(&str, &str)] = &[("created_at", "p.created_at"), ("start_time", "p.start_time")];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PomodoroRow {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    #[serde(rename = "task")]
    pub task_id: Option<String>,
    pub work_duration: i64,
    pub break_duration: i64,
    pub long_break_duration: i64,
    pub sessions_completed: i64,
    pub current_session_type: SessionType,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PomodoroFields {
    pub task_id: Option<String>,
    pub work_duration: i64,
    pub break_duration: i64,
    pub long_break_duration: i64,
    pub sessions_completed: i64,
    pub current_session_type: SessionType,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
}

pub async fn list_pomodoros(db: &SqlitePool, user_id: &str, params: &ListParams) -> ApiResult<Page<PomodoroRow>> {
    let c = owned("p.user_id", user_id);
    let order = pagination::order_by(params.ordering.as_deref(), POMODORO_ORDERING, "p.created_at DESC")?;
    pagination::paginate(db, POMODORO_SELECT, POMODORO_FROM, &c, &order, params).await
}

pub async fn get_pomodoro(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<PomodoroRow> {
    sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE p.id = ? AND p.user_id = ?",
        POMODORO_SELECT, POMODORO_FROM
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Pomodoro session"))
}

/// A new session starts now
pub async fn create_pomodoro(db: &SqlitePool, user_id: &str, fields: PomodoroFields) -> ApiResult<PomodoroRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    sqlx::query(
        "INSERT INTO pomodoro_sessions (id, user_id, task_id, work_duration, break_duration, long_break_duration,
            sessions_completed, current_session_type, start_time, end_time, is_active, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(&fields.task_id)
    .bind(fields.work_duration)
    .bind(fields.break_duration)
    .bind(fields.long_break_duration)
    .bind(fields.sessions_completed)
    .bind(fields.current_session_type)
    .bind(now)
    .bind(fields.end_time)
    .bind(fields.is_active)
    .bind(now)
    .execute(db)
    .await?;

    get_pomodoro(db, &id, user_id).await
}

pub async fn update_pomodoro(
    db: &SqlitePool,
    id: &str,
    user_id: &str,
    fields: PomodoroFields,
) -> ApiResult<PomodoroRow> {
    sqlx::query(
        "UPDATE pomodoro_sessions SET task_id = ?, work_duration = ?, break_duration = ?, long_break_duration = ?,
            sessions_completed = ?, current_session_type = ?, end_time = ?, is_active = ?
         WHERE id = ? AND user_id = ?",
    )
    .bind(&fields.task_id)
    .bind(fields.work_duration)
    .bind(fields.break_duration)
    .bind(fields.long_break_duration)
    .bind(fields.sessions_completed)
    .bind(fields.current_session_type)
    .bind(fields.end_time)
    .bind(fields.is_active)
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    get_pomodoro(db, id, user_id).await
}

// ========================================
// Efficiency records
// ========================================

const EFFICIENCY_SELECT: &str = "e.id, e.user_id, e.date, e.focus_hours, e.tasks_completed, e.tasks_planned,
    e.efficiency_score, e.created_at, e.updated_at";
const EFFICIENCY_FROM: &str = "efficiency_records e";

const EFFICIENCY_ORDERING: &[(&str, &str)] = &[
    ("date", "e.date"),
    ("efficiency_score", "e.efficiency_score"),
    ("focus_hours", "e.focus_hours"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EfficiencyRow {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    pub date: NaiveDate,
    pub focus_hours: f64,
    pub tasks_completed: i64,
    pub tasks_planned: i64,
    pub efficiency_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct EfficiencyFields {
    pub date: NaiveDate,
    pub focus_hours: f64,
    pub tasks_completed: i64,
    pub tasks_planned: i64,
}

impl EfficiencyFields {
    /// Score for these figures, `previous` when nothing was planned
    pub fn score(&self, previous: f64) -> f64 {
        efficiency_score(self.focus_hours, self.tasks_completed, self.tasks_planned).unwrap_or(previous)
    }
}

pub async fn list_efficiency(
    db: &SqlitePool,
    user_id: &str,
    date: Option<NaiveDate>,
    params: &ListParams,
) -> ApiResult<Page<EfficiencyRow>> {
    let mut c = owned("e.user_id", user_id);
    c.eq("e.date", date);
    let order = pagination::order_by(params.ordering.as_deref(), EFFICIENCY_ORDERING, "e.date DESC")?;
    pagination::paginate(db, EFFICIENCY_SELECT, EFFICIENCY_FROM, &c, &order, params).await
}

pub async fn get_efficiency(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<EfficiencyRow> {
    sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE e.id = ? AND e.user_id = ?",
        EFFICIENCY_SELECT, EFFICIENCY_FROM
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Efficiency record"))
}

pub async fn create_efficiency(db: &SqlitePool, user_id: &str, fields: EfficiencyFields) -> ApiResult<EfficiencyRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    sqlx::query(
        "INSERT INTO efficiency_records (id, user_id, date, focus_hours, tasks_completed, tasks_planned,
            efficiency_score, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(fields.date)
    .bind(fields.focus_hours)
    .bind(fields.tasks_completed)
    .bind(fields.tasks_planned)
    .bind(fields.score(0.0))
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    get_efficiency(db, &id, user_id).await
}

pub async fn update_efficiency(
    db: &SqlitePool,
    current: &EfficiencyRow,
    fields: EfficiencyFields,
) -> ApiResult<EfficiencyRow> {
    sqlx::query(
        "UPDATE efficiency_records SET date = ?, focus_hours = ?, tasks_completed = ?, tasks_planned = ?,
            efficiency_score = ?, updated_at = ?
         WHERE id = ? AND user_id = ?",
    )
    .bind(fields.date)
    .bind(fields.focus_hours)
    .bind(fields.tasks_completed)
    .bind(fields.tasks_planned)
    .bind(fields.score(current.efficiency_score))
    .bind(time::now())
    .bind(&current.id)
    .bind(&current.user_id)
    .execute(db)
    .await?;

    get_efficiency(db, &current.id, &current.user_id).await
}
