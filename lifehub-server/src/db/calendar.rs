//! Calendars and events

use chrono::{DateTime, Utc};
use lifehub_common::models::EventType;
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::{types::Json, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page};

// ========================================
// Calendars
// ========================================

const CALENDAR_SELECT: &str = "c.id, c.name, c.description, c.color, c.creator_id, c.is_default, c.created_at";
const CALENDAR_FROM: &str = "calendars c";

const CALENDAR_ORDERING: &[(&str, &str)] = &[("created_at", "c.created_at"), ("name", "c.name")];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CalendarRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CalendarFields {
    pub name: String,
    pub description: String,
    pub color: String,
    pub is_default: bool,
}

pub async fn list_calendars(
    db: &SqlitePool,
    user_id: &str,
    is_default: Option<bool>,
    params: &ListParams,
) -> ApiResult<Page<CalendarRow>> {
    let mut c = Conditions::new();
    c.eq("c.creator_id", Some(user_id))
        .eq("c.is_default", is_default)
        .search(&["c.name", "c.description"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), CALENDAR_ORDERING, "c.created_at DESC")?;
    pagination::paginate(db, CALENDAR_SELECT, CALENDAR_FROM, &c, &order, params).await
}

pub async fn get_calendar(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<CalendarRow> {
    sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE c.id = ? AND c.creator_id = ?",
        CALENDAR_SELECT, CALENDAR_FROM
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Calendar"))
}

/// Clear `is_default` on the user's other calendars
async fn clear_other_defaults(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
    keep_id: &str,
) -> ApiResult<()> {
    sqlx::query("UPDATE calendars SET is_default = 0 WHERE creator_id = ? AND id != ? AND is_default = 1")
        .bind(user_id)
        .bind(keep_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// A user has at most one default calendar
pub async fn create_calendar(db: &SqlitePool, user_id: &str, fields: CalendarFields) -> ApiResult<CalendarRow> {
    let id = uuid_utils::generate();
    let mut tx = db.begin().await?;
    if fields.is_default {
        clear_other_defaults(&mut tx, user_id, &id).await?;
    }
    sqlx::query(
        "INSERT INTO calendars (id, name, description, color, creator_id, is_default, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(&fields.color)
    .bind(user_id)
    .bind(fields.is_default)
    .bind(time::now())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    get_calendar(db, &id, user_id).await
}

pub async fn update_calendar(db: &SqlitePool, id: &str, user_id: &str, fields: CalendarFields) -> ApiResult<CalendarRow> {
    let mut tx = db.begin().await?;
    if fields.is_default {
        clear_other_defaults(&mut tx, user_id, id).await?;
    }
    sqlx::query("UPDATE calendars SET name = ?, description = ?, color = ?, is_default = ? WHERE id = ? AND creator_id = ?")
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(&fields.color)
        .bind(fields.is_default)
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    get_calendar(db, id, user_id).await
}

// ========================================
// Events
// ========================================

const EVENT_SELECT: &str = "e.id, e.title, e.description, e.event_type, e.start_time, e.end_time,
    e.timezone_offset, e.is_all_day, e.location, e.calendar_id, c.name AS calendar_name, e.creator_id,
    (SELECT json_group_array(ep.user_id) FROM event_participants ep WHERE ep.event_id = e.id) AS participants,
    e.reminder_minutes, e.reminder_sent, e.created_at, e.updated_at";

const EVENT_FROM: &str = "events e JOIN calendars c ON c.id = e.calendar_id";

const EVENT_ORDERING: &[(&str, &str)] = &[
    ("start_time", "e.start_time"),
    ("end_time", "e.end_time"),
    ("created_at", "e.created_at"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EventRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone_offset: i64,
    pub is_all_day: bool,
    pub location: String,
    #[serde(rename = "calendar")]
    pub calendar_id: String,
    pub calendar_name: String,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub participants: Json<Vec<String>>,
    pub reminder_minutes: i64,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct EventFilter {
    pub calendar: Option<String>,
    pub event_type: Option<EventType>,
    pub is_all_day: Option<bool>,
}

#[derive(Debug)]
pub struct EventFields {
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone_offset: i64,
    pub is_all_day: bool,
    pub location: String,
    pub calendar_id: String,
    pub reminder_minutes: i64,
    pub reminder_sent: bool,
}

fn own_events(user_id: &str) -> Conditions {
    let mut c = Conditions::new();
    c.eq("e.creator_id", Some(user_id));
    c
}

pub async fn list_events(
    db: &SqlitePool,
    user_id: &str,
    filter: EventFilter,
    params: &ListParams,
) -> ApiResult<Page<EventRow>> {
    let mut c = own_events(user_id);
    c.eq("e.calendar_id", filter.calendar)
        .eq("e.event_type", filter.event_type.map(|t| t.as_str()))
        .eq("e.is_all_day", filter.is_all_day)
        .search(&["e.title", "e.description", "e.location"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), EVENT_ORDERING, "e.start_time ASC")?;
    pagination::paginate(db, EVENT_SELECT, EVENT_FROM, &c, &order, params).await
}

/// Events starting within `[from, to)`
pub async fn events_between(
    db: &SqlitePool,
    user_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> ApiResult<Vec<EventRow>> {
    let mut c = own_events(user_id);
    c.cmp("e.start_time", ">=", Some(from)).cmp("e.start_time", "<", Some(to));
    pagination::fetch_all(db, EVENT_SELECT, EVENT_FROM, &c, "e.start_time ASC").await
}

pub async fn get_event(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<EventRow> {
    let mut c = own_events(user_id);
    c.eq("e.id", Some(id));
    pagination::fetch_all::<EventRow>(db, EVENT_SELECT, EVENT_FROM, &c, "e.id")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Event"))
}

async fn replace_participants(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    event_id: &str,
    participants: &[String],
) -> ApiResult<()> {
    sqlx::query("DELETE FROM event_participants WHERE event_id = ?")
        .bind(event_id)
        .execute(&mut **tx)
        .await?;
    for user_id in participants {
        sqlx::query("INSERT OR IGNORE INTO event_participants (event_id, user_id) VALUES (?, ?)")
            .bind(event_id)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

pub async fn create_event(
    db: &SqlitePool,
    user_id: &str,
    fields: EventFields,
    participants: &[String],
) -> ApiResult<EventRow> {
    let id = uuid_utils::generate();
    let now = time::now();

    let mut tx = db.begin().await?;
    sqlx::query(
        "INSERT INTO events (id, title, description, event_type, start_time, end_time, timezone_offset,
            is_all_day, location, calendar_id, creator_id, reminder_minutes, reminder_sent, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.event_type)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(fields.timezone_offset)
    .bind(fields.is_all_day)
    .bind(&fields.location)
    .bind(&fields.calendar_id)
    .bind(user_id)
    .bind(fields.reminder_minutes)
    .bind(fields.reminder_sent)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    replace_participants(&mut tx, &id, participants).await?;
    tx.commit().await?;

    get_event(db, &id, user_id).await
}

pub async fn update_event(
    db: &SqlitePool,
    id: &str,
    user_id: &str,
    fields: EventFields,
    participants: Option<&[String]>,
) -> ApiResult<EventRow> {
    let mut tx = db.begin().await?;
    sqlx::query(
        "UPDATE events SET title = ?, description = ?, event_type = ?, start_time = ?, end_time = ?,
            timezone_offset = ?, is_all_day = ?, location = ?, calendar_id = ?, reminder_minutes = ?,
            reminder_sent = ?, updated_at = ?
         WHERE id = ? AND creator_id = ?",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.event_type)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(fields.timezone_offset)
    .bind(fields.is_all_day)
    .bind(&fields.location)
    .bind(&fields.calendar_id)
    .bind(fields.reminder_minutes)
    .bind(fields.reminder_sent)
    .bind(time::now())
    .bind(id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    if let Some(participants) = participants {
        replace_participants(&mut tx, id, participants).await?;
    }
    tx.commit().await?;

    get_event(db, id, user_id).await
}

/// Keep only ids of existing users
pub async fn existing_users(db: &SqlitePool, ids: &[String]) -> ApiResult<Vec<String>> {
    let mut found = Vec::with_capacity(ids.len());
    for id in ids {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        if exists.is_none() {
            return Err(ApiError::field(
                "participants",
                format!("Invalid pk \"{}\" - object does not exist.", id),
            ));
        }
        if !found.contains(id) {
            found.push(id.clone());
        }
    }
    Ok(found)
}
