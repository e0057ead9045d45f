//! Habit and check-in endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate, NaiveTime};
use lifehub_common::formulas::completion_rate;
use lifehub_common::patch::merge;
use lifehub_common::streak::StreakSummary;
use lifehub_common::time;
use serde::{Deserialize, Serialize};

use crate::db::delete_owned;
use crate::db::habits::{self, HabitFields, HabitRecordRow, HabitRow};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::validate;
use crate::AppState;

/// Window the completion rate in habit stats is measured against
const STATS_WINDOW_DAYS: i64 = 30;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/life/habits", get(list_habits).post(create_habit))
        .route("/api/life/habits/today_status", get(today_status))
        .route(
            "/api/life/habits/:id",
            get(get_habit).put(update_habit).patch(update_habit).delete(delete_habit),
        )
        .route("/api/life/habits/:id/check_in", post(check_in))
        .route("/api/life/habits/:id/cancel_check_in", post(cancel_check_in).delete(cancel_check_in))
        .route("/api/life/habits/:id/records", get(records))
        .route("/api/life/habits/:id/stats", get(stats))
}

#[derive(Debug, Deserialize)]
pub struct HabitQuery {
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateHabit {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_target")]
    pub target_days: i64,
    #[serde(default = "default_true")]
    pub reminder_enabled: bool,
    #[serde(default = "default_reminder_time")]
    pub reminder_time: NaiveTime,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_target() -> i64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_reminder_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct UpdateHabit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub target_days: Option<i64>,
    pub reminder_enabled: Option<bool>,
    pub reminder_time: Option<NaiveTime>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckInRequest {
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CheckInResponse {
    pub message: String,
    pub date: NaiveDate,
    pub created: bool,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_days: i64,
}

#[derive(Debug, Serialize)]
pub struct DayStatus {
    pub date: NaiveDate,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct HabitStats {
    pub total_days: i64,
    pub completed_days: i64,
    pub streak_days: i64,
    pub completion_rate: f64,
    pub this_week_records: Vec<DayStatus>,
}

#[derive(Debug, Serialize)]
pub struct TodayRecord {
    pub habit_id: String,
    pub completed: bool,
    pub notes: String,
}

#[derive(Debug, Serialize)]
pub struct TodayStatus {
    pub records: Vec<TodayRecord>,
}

fn check_fields(fields: HabitFields) -> ApiResult<HabitFields> {
    validate::max_len("description", &fields.description, 200)?;
    if fields.target_days <= 0 {
        return Err(ApiError::field("target_days", "Ensure this value is greater than 0."));
    }
    Ok(HabitFields {
        name: validate::required_text("name", &fields.name, 100)?,
        ..fields
    })
}

pub async fn list_habits(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<HabitQuery>,
) -> ApiResult<Json<Page<HabitRow>>> {
    Ok(Json(habits::list(&state.db, &user.id, query.is_active, &params).await?))
}

pub async fn create_habit(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateHabit>,
) -> ApiResult<(StatusCode, Json<HabitRow>)> {
    let fields = check_fields(HabitFields {
        name: req.name,
        description: req.description,
        target_days: req.target_days,
        reminder_enabled: req.reminder_enabled,
        reminder_time: req.reminder_time,
        is_active: req.is_active,
    })?;
    Ok((StatusCode::CREATED, Json(habits::create(&state.db, &user.id, fields).await?)))
}

pub async fn get_habit(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<HabitRow>> {
    Ok(Json(habits::get(&state.db, &id, &user.id).await?))
}

pub async fn update_habit(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateHabit>,
) -> ApiResult<Json<HabitRow>> {
    let current = habits::get(&state.db, &id, &user.id).await?;
    let fields = check_fields(HabitFields {
        name: merge(current.name, req.name),
        description: merge(current.description, req.description),
        target_days: merge(current.target_days, req.target_days),
        reminder_enabled: merge(current.reminder_enabled, req.reminder_enabled),
        reminder_time: merge(current.reminder_time, req.reminder_time),
        is_active: merge(current.is_active, req.is_active),
    })?;
    Ok(Json(habits::update(&state.db, &id, &user.id, fields).await?))
}

pub async fn delete_habit(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "habits", "creator_id", &id, &user.id, "Habit").await?;
    Ok(StatusCode::NO_CONTENT)
}

fn check_in_response(message: &str, date: NaiveDate, created: bool, summary: StreakSummary) -> CheckInResponse {
    CheckInResponse {
        message: message.to_string(),
        date,
        created,
        current_streak: summary.current,
        longest_streak: summary.longest,
        total_days: summary.total,
    }
}

/// POST /api/life/habits/:id/check_in
///
/// The body is optional; the date defaults to today.
pub async fn check_in(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    body: Option<ApiJson<CheckInRequest>>,
) -> ApiResult<Json<CheckInResponse>> {
    let habit = habits::get(&state.db, &id, &user.id).await?;
    let req = body.map(|ApiJson(req)| req).unwrap_or_default();
    let date = req.date.unwrap_or_else(time::today);

    let created = habits::check_in(&state.db, &habit.id, date, &req.notes).await?;
    let summary = habits::refresh_streaks(&state.db, &habit.id).await?;
    let message = if created { "Checked in" } else { "Already checked in" };
    Ok(Json(check_in_response(message, date, created, summary)))
}

/// POST|DELETE /api/life/habits/:id/cancel_check_in?date=YYYY-MM-DD
pub async fn cancel_check_in(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<DateQuery>,
) -> ApiResult<Json<CheckInResponse>> {
    let habit = habits::get(&state.db, &id, &user.id).await?;
    let date = query.date.unwrap_or_else(time::today);

    if !habits::cancel_check_in(&state.db, &habit.id, date).await? {
        return Err(ApiError::NotFound("Check-in record not found".to_string()));
    }
    let summary = habits::refresh_streaks(&state.db, &habit.id).await?;
    Ok(Json(check_in_response("Check-in cancelled", date, false, summary)))
}

/// GET /api/life/habits/:id/records
pub async fn records(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> ApiResult<Json<Vec<HabitRecordRow>>> {
    let habit = habits::get(&state.db, &id, &user.id).await?;
    Ok(Json(habits::records(&state.db, &habit.id, range.start_date, range.end_date).await?))
}

/// GET /api/life/habits/:id/stats
pub async fn stats(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<HabitStats>> {
    let habit = habits::get(&state.db, &id, &user.id).await?;
    let summary = habits::refresh_streaks(&state.db, &habit.id).await?;
    let dates = habits::completed_dates(&state.db, &habit.id).await?;

    let monday = time::week_start(time::today());
    let this_week_records = (0..7)
        .map(|offset| {
            let date = monday + Duration::days(offset);
            DayStatus {
                date,
                completed: dates.contains(&date),
            }
        })
        .collect();

    Ok(Json(HabitStats {
        total_days: STATS_WINDOW_DAYS,
        completed_days: summary.total,
        streak_days: summary.current,
        completion_rate: completion_rate(summary.total, STATS_WINDOW_DAYS),
        this_week_records,
    }))
}

/// GET /api/life/habits/today_status
pub async fn today_status(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<TodayStatus>> {
    let today = time::today();
    let mut records = Vec::new();
    for habit in habits::active(&state.db, &user.id).await? {
        let record = habits::record_on(&state.db, &habit.id, today)
            .await?
            .filter(|r| r.completed);
        records.push(TodayRecord {
            habit_id: habit.id,
            completed: record.is_some(),
            notes: record.map(|r| r.notes).unwrap_or_default(),
        });
    }
    Ok(Json(TodayStatus { records }))
}
