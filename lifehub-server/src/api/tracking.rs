//! Time records, pomodoro sessions and efficiency endpoints

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use lifehub_common::models::SessionType;
use lifehub_common::patch::{deserialize_some, merge};
use serde::Deserialize;

use crate::db::tracking::{
    self, EfficiencyFields, EfficiencyRow, PomodoroFields, PomodoroRow, TimeRecordFields, TimeRecordRow,
};
use crate::db::{delete_owned, tasks};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::validate;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/time/time-records", get(list_records).post(create_record))
        .route(
            "/api/time/time-records/:id",
            get(get_record).put(update_record).patch(update_record).delete(delete_record),
        )
        .route("/api/time/pomodoro", get(list_pomodoros).post(create_pomodoro))
        .route(
            "/api/time/pomodoro/:id",
            get(get_pomodoro).put(update_pomodoro).patch(update_pomodoro).delete(delete_pomodoro),
        )
        .route("/api/time/efficiency", get(list_efficiency).post(create_efficiency))
        .route(
            "/api/time/efficiency/:id",
            get(get_efficiency).put(update_efficiency).patch(update_efficiency).delete(delete_efficiency),
        )
}

/// A linked task must be visible to the user
async fn check_task(state: &AppState, user: &AuthUser, task_id: Option<&String>) -> ApiResult<()> {
    if let Some(task_id) = task_id {
        if tasks::get_visible(&state.db, task_id, &user.id).await.is_err() {
            return Err(ApiError::field(
                "task",
                format!("Invalid pk \"{}\" - object does not exist.", task_id),
            ));
        }
    }
    Ok(())
}

// ========================================
// Time records
// ========================================

#[derive(Debug, Deserialize)]
pub struct TimeRecordQuery {
    pub task: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTimeRecord {
    pub task: Option<String>,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTimeRecord {
    #[serde(default, deserialize_with = "deserialize_some")]
    pub task: Option<Option<String>>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub end_time: Option<Option<DateTime<Utc>>>,
}

async fn check_record(state: &AppState, user: &AuthUser, fields: TimeRecordFields) -> ApiResult<TimeRecordFields> {
    let description = validate::required_text("description", &fields.description, 200)?;
    if let Some(end) = fields.end_time {
        if end < fields.start_time {
            return Err(ApiError::field("end_time", "End time must not be before start time"));
        }
    }
    check_task(state, user, fields.task_id.as_ref()).await?;
    Ok(TimeRecordFields { description, ..fields })
}

pub async fn list_records(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<TimeRecordQuery>,
) -> ApiResult<Json<Page<TimeRecordRow>>> {
    Ok(Json(tracking::list_records(&state.db, &user.id, query.task, &params).await?))
}

pub async fn create_record(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateTimeRecord>,
) -> ApiResult<(StatusCode, Json<TimeRecordRow>)> {
    let fields = check_record(
        &state,
        &user,
        TimeRecordFields {
            task_id: req.task,
            description: req.description,
            start_time: req.start_time,
            end_time: req.end_time,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(tracking::create_record(&state.db, &user.id, fields).await?)))
}

pub async fn get_record(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<TimeRecordRow>> {
    Ok(Json(tracking::get_record(&state.db, &id, &user.id).await?))
}

pub async fn update_record(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateTimeRecord>,
) -> ApiResult<Json<TimeRecordRow>> {
    let current = tracking::get_record(&state.db, &id, &user.id).await?;
    let fields = check_record(
        &state,
        &user,
        TimeRecordFields {
            task_id: merge(current.task_id, req.task),
            description: merge(current.description, req.description),
            start_time: merge(current.start_time, req.start_time),
            end_time: merge(current.end_time, req.end_time),
        },
    )
    .await?;
    Ok(Json(tracking::update_record(&state.db, &id, &user.id, fields).await?))
}

pub async fn delete_record(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "time_records", "user_id", &id, &user.id, "Time record").await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Pomodoro
// ========================================

#[derive(Debug, Deserialize)]
pub struct CreatePomodoro {
    pub task: Option<String>,
    #[serde(default = "default_work")]
    pub work_duration: i64,
    #[serde(default = "default_break")]
    pub break_duration: i64,
    #[serde(default = "default_long_break")]
    pub long_break_duration: i64,
    #[serde(default)]
    pub sessions_completed: i64,
    #[serde(default = "default_session_type")]
    pub current_session_type: SessionType,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_work() -> i64 {
    25
}

fn default_break() -> i64 {
    5
}

fn default_long_break() -> i64 {
    15
}

fn default_session_type() -> SessionType {
    SessionType::Work
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdatePomodoro {
    #[serde(default, deserialize_with = "deserialize_some")]
    pub task: Option<Option<String>>,
    pub work_duration: Option<i64>,
    pub break_duration: Option<i64>,
    pub long_break_duration: Option<i64>,
    pub sessions_completed: Option<i64>,
    pub current_session_type: Option<SessionType>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub end_time: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

async fn check_pomodoro(state: &AppState, user: &AuthUser, fields: PomodoroFields) -> ApiResult<PomodoroFields> {
    for (field, minutes) in [
        ("work_duration", fields.work_duration),
        ("break_duration", fields.break_duration),
        ("long_break_duration", fields.long_break_duration),
    ] {
        if minutes <= 0 {
            return Err(ApiError::field(field, "Ensure this value is greater than 0."));
        }
    }
    if fields.sessions_completed < 0 {
        return Err(ApiError::field("sessions_completed", "Ensure this value is greater than or equal to 0."));
    }
    check_task(state, user, fields.task_id.as_ref()).await?;
    Ok(fields)
}

pub async fn list_pomodoros(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<Page<PomodoroRow>>> {
    Ok(Json(tracking::list_pomodoros(&state.db, &user.id, &params).await?))
}

pub async fn create_pomodoro(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreatePomodoro>,
) -> ApiResult<(StatusCode, Json<PomodoroRow>)> {
    let fields = check_pomodoro(
        &state,
        &user,
        PomodoroFields {
            task_id: req.task,
            work_duration: req.work_duration,
            break_duration: req.break_duration,
            long_break_duration: req.long_break_duration,
            sessions_completed: req.sessions_completed,
            current_session_type: req.current_session_type,
            end_time: req.end_time,
            is_active: req.is_active,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(tracking::create_pomodoro(&state.db, &user.id, fields).await?)))
}

pub async fn get_pomodoro(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<PomodoroRow>> {
    Ok(Json(tracking::get_pomodoro(&state.db, &id, &user.id).await?))
}

pub async fn update_pomodoro(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdatePomodoro>,
) -> ApiResult<Json<PomodoroRow>> {
    let current = tracking::get_pomodoro(&state.db, &id, &user.id).await?;
    let fields = check_pomodoro(
        &state,
        &user,
        PomodoroFields {
            task_id: merge(current.task_id, req.task),
            work_duration: merge(current.work_duration, req.work_duration),
            break_duration: merge(current.break_duration, req.break_duration),
            long_break_duration: merge(current.long_break_duration, req.long_break_duration),
            sessions_completed: merge(current.sessions_completed, req.sessions_completed),
            current_session_type: merge(current.current_session_type, req.current_session_type),
            end_time: merge(current.end_time, req.end_time),
            is_active: merge(current.is_active, req.is_active),
        },
    )
    .await?;
    Ok(Json(tracking::update_pomodoro(&state.db, &id, &user.id, fields).await?))
}

pub async fn delete_pomodoro(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "pomodoro_sessions", "user_id", &id, &user.id, "Pomodoro session").await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Efficiency
// ========================================

#[derive(Debug, Deserialize)]
pub struct EfficiencyQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEfficiency {
    pub date: NaiveDate,
    #[serde(default)]
    pub focus_hours: f64,
    #[serde(default)]
    pub tasks_completed: i64,
    #[serde(default)]
    pub tasks_planned: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEfficiency {
    pub date: Option<NaiveDate>,
    pub focus_hours: Option<f64>,
    pub tasks_completed: Option<i64>,
    pub tasks_planned: Option<i64>,
}

fn check_efficiency(fields: EfficiencyFields) -> ApiResult<EfficiencyFields> {
    validate::non_negative("focus_hours", fields.focus_hours)?;
    if fields.tasks_completed < 0 {
        return Err(ApiError::field("tasks_completed", "Ensure this value is greater than or equal to 0."));
    }
    if fields.tasks_planned < 0 {
        return Err(ApiError::field("tasks_planned", "Ensure this value is greater than or equal to 0."));
    }
    Ok(fields)
}

pub async fn list_efficiency(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<EfficiencyQuery>,
) -> ApiResult<Json<Page<EfficiencyRow>>> {
    Ok(Json(tracking::list_efficiency(&state.db, &user.id, query.date, &params).await?))
}

pub async fn create_efficiency(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateEfficiency>,
) -> ApiResult<(StatusCode, Json<EfficiencyRow>)> {
    let fields = check_efficiency(EfficiencyFields {
        date: req.date,
        focus_hours: req.focus_hours,
        tasks_completed: req.tasks_completed,
        tasks_planned: req.tasks_planned,
    })?;
    Ok((StatusCode::CREATED, Json(tracking::create_efficiency(&state.db, &user.id, fields).await?)))
}

pub async fn get_efficiency(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<EfficiencyRow>> {
    Ok(Json(tracking::get_efficiency(&state.db, &id, &user.id).await?))
}

pub async fn update_efficiency(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateEfficiency>,
) -> ApiResult<Json<EfficiencyRow>> {
    let current = tracking::get_efficiency(&state.db, &id, &user.id).await?;
    let fields = check_efficiency(EfficiencyFields {
        date: merge(current.date, req.date),
        focus_hours: merge(current.focus_hours, req.focus_hours),
        tasks_completed: merge(current.tasks_completed, req.tasks_completed),
        tasks_planned: merge(current.tasks_planned, req.tasks_planned),
    })?;
    Ok(Json(tracking::update_efficiency(&state.db, &current, fields).await?))
}

pub async fn delete_efficiency(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "efficiency_records", "user_id", &id, &user.id, "Efficiency record").await?;
    Ok(StatusCode::NO_CONTENT)
}
