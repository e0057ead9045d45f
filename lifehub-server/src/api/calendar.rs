//! Calendar and event endpoints

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use lifehub_common::models::EventType;
use lifehub_common::patch::merge;
use lifehub_common::time;
use serde::Deserialize;

use crate::db::calendar::{self, CalendarFields, CalendarRow, EventFields, EventFilter, EventRow};
use crate::db::delete_owned;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::validate;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/time/calendars", get(list_calendars).post(create_calendar))
        .route(
            "/api/time/calendars/:id",
            get(get_calendar).put(update_calendar).patch(update_calendar).delete(delete_calendar),
        )
        .route("/api/time/events", get(list_events).post(create_event))
        .route("/api/time/events/today", get(today_events))
        .route(
            "/api/time/events/:id",
            get(get_event).put(update_event).patch(update_event).delete(delete_event),
        )
}

// ========================================
// Calendars
// ========================================

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub is_default: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCalendar {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub is_default: bool,
}

fn default_color() -> String {
    "#1890ff".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateCalendar {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_default: Option<bool>,
}

fn check_calendar(fields: CalendarFields) -> ApiResult<CalendarFields> {
    Ok(CalendarFields {
        name: validate::required_text("name", &fields.name, 100)?,
        color: validate::hex_color("color", &fields.color)?,
        ..fields
    })
}

pub async fn list_calendars(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<CalendarQuery>,
) -> ApiResult<Json<Page<CalendarRow>>> {
    Ok(Json(calendar::list_calendars(&state.db, &user.id, query.is_default, &params).await?))
}

pub async fn create_calendar(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateCalendar>,
) -> ApiResult<(StatusCode, Json<CalendarRow>)> {
    let fields = check_calendar(CalendarFields {
        name: req.name,
        description: req.description,
        color: req.color,
        is_default: req.is_default,
    })?;
    let row = calendar::create_calendar(&state.db, &user.id, fields).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn get_calendar(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<CalendarRow>> {
    Ok(Json(calendar::get_calendar(&state.db, &id, &user.id).await?))
}

pub async fn update_calendar(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateCalendar>,
) -> ApiResult<Json<CalendarRow>> {
    let current = calendar::get_calendar(&state.db, &id, &user.id).await?;
    let fields = check_calendar(CalendarFields {
        name: merge(current.name, req.name),
        description: merge(current.description, req.description),
        color: merge(current.color, req.color),
        is_default: merge(current.is_default, req.is_default),
    })?;
    Ok(Json(calendar::update_calendar(&state.db, &id, &user.id, fields).await?))
}

pub async fn delete_calendar(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "calendars", "creator_id", &id, &user.id, "Calendar").await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Events
// ========================================

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub calendar: Option<String>,
    pub event_type: Option<EventType>,
    pub is_all_day: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_event_type")]
    pub event_type: EventType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub timezone_offset: i64,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub location: String,
    pub calendar: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default = "default_reminder")]
    pub reminder_minutes: i64,
    #[serde(default)]
    pub reminder_sent: bool,
}

fn default_event_type() -> EventType {
    EventType::Work
}

fn default_reminder() -> i64 {
    15
}

#[derive(Debug, Deserialize)]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<EventType>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub timezone_offset: Option<i64>,
    pub is_all_day: Option<bool>,
    pub location: Option<String>,
    pub calendar: Option<String>,
    pub participants: Option<Vec<String>>,
    pub reminder_minutes: Option<i64>,
    pub reminder_sent: Option<bool>,
}

async fn check_event(state: &AppState, user: &AuthUser, fields: EventFields) -> ApiResult<EventFields> {
    let title = validate::required_text("title", &fields.title, 200)?;
    validate::max_len("location", &fields.location, 200)?;
    if fields.end_time < fields.start_time {
        return Err(ApiError::field("end_time", "End time must not be before start time"));
    }
    if fields.reminder_minutes < 0 {
        return Err(ApiError::field("reminder_minutes", "Ensure this value is greater than or equal to 0."));
    }
    if calendar::get_calendar(&state.db, &fields.calendar_id, &user.id).await.is_err() {
        return Err(ApiError::field(
            "calendar",
            format!("Invalid pk \"{}\" - object does not exist.", fields.calendar_id),
        ));
    }
    Ok(EventFields { title, ..fields })
}

pub async fn list_events(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<EventQuery>,
) -> ApiResult<Json<Page<EventRow>>> {
    let filter = EventFilter {
        calendar: query.calendar,
        event_type: query.event_type,
        is_all_day: query.is_all_day,
    };
    Ok(Json(calendar::list_events(&state.db, &user.id, filter, &params).await?))
}

/// GET /api/time/events/today
pub async fn today_events(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<EventRow>>> {
    let (start, end) = time::day_bounds(time::today());
    Ok(Json(calendar::events_between(&state.db, &user.id, start, end).await?))
}

pub async fn create_event(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateEvent>,
) -> ApiResult<(StatusCode, Json<EventRow>)> {
    let fields = check_event(
        &state,
        &user,
        EventFields {
            title: req.title,
            description: req.description,
            event_type: req.event_type,
            start_time: req.start_time,
            end_time: req.end_time,
            timezone_offset: req.timezone_offset,
            is_all_day: req.is_all_day,
            location: req.location,
            calendar_id: req.calendar,
            reminder_minutes: req.reminder_minutes,
            reminder_sent: req.reminder_sent,
        },
    )
    .await?;
    let participants = calendar::existing_users(&state.db, &req.participants).await?;

    let event = calendar::create_event(&state.db, &user.id, fields, &participants).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_event(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<EventRow>> {
    Ok(Json(calendar::get_event(&state.db, &id, &user.id).await?))
}

pub async fn update_event(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateEvent>,
) -> ApiResult<Json<EventRow>> {
    let current = calendar::get_event(&state.db, &id, &user.id).await?;
    let fields = check_event(
        &state,
        &user,
        EventFields {
            title: merge(current.title, req.title),
            description: merge(current.description, req.description),
            event_type: merge(current.event_type, req.event_type),
            start_time: merge(current.start_time, req.start_time),
            end_time: merge(current.end_time, req.end_time),
            timezone_offset: merge(current.timezone_offset, req.timezone_offset),
            is_all_day: merge(current.is_all_day, req.is_all_day),
            location: merge(current.location, req.location),
            calendar_id: merge(current.calendar_id, req.calendar),
            reminder_minutes: merge(current.reminder_minutes, req.reminder_minutes),
            reminder_sent: merge(current.reminder_sent, req.reminder_sent),
        },
    )
    .await?;
    let participants = match &req.participants {
        Some(ids) => Some(calendar::existing_users(&state.db, ids).await?),
        None => None,
    };

    Ok(Json(
        calendar::update_event(&state.db, &id, &user.id, fields, participants.as_deref()).await?,
    ))
}

pub async fn delete_event(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "events", "creator_id", &id, &user.id, "Event").await?;
    Ok(StatusCode::NO_CONTENT)
}
