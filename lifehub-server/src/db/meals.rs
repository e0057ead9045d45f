//! Meal log

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use lifehub_common::models::MealType;
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page};

const SELECT: &str = "m.id, m.meal_type, m.description, m.calories, m.notes, m.creator_id, m.date, m.time, m.created_at";
const FROM: &str = "meal_records m";

const ORDERING: &[(&str, &str)] = &[
    ("date", "m.date"),
    ("time", "m.time"),
    ("calories", "m.calories"),
    ("created_at", "m.created_at"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MealRow {
    pub id: String,
    pub meal_type: MealType,
    pub description: String,
    pub calories: Option<i64>,
    pub notes: String,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct MealFields {
    pub meal_type: MealType,
    pub description: String,
    pub calories: Option<i64>,
    pub notes: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DailyCalories {
    pub date: NaiveDate,
    pub calories: i64,
}

fn owned(user_id: &str) -> Conditions {
    let mut c = Conditions::new();
    c.eq("m.creator_id", Some(user_id));
    c
}

pub async fn list(
    db: &SqlitePool,
    user_id: &str,
    meal_type: Option<MealType>,
    params: &ListParams,
) -> ApiResult<Page<MealRow>> {
    let mut c = owned(user_id);
    c.eq("m.meal_type", meal_type.map(|t| t.as_str()))
        .search(&["m.description", "m.notes"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), ORDERING, "m.date DESC, m.time DESC")?;
    pagination::paginate(db, SELECT, FROM, &c, &order, params).await
}

pub async fn on_date(db: &SqlitePool, user_id: &str, date: NaiveDate) -> ApiResult<Vec<MealRow>> {
    let mut c = owned(user_id);
    c.eq("m.date", Some(date));
    pagination::fetch_all(db, SELECT, FROM, &c, "m.time ASC").await
}

pub async fn get(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<MealRow> {
    sqlx::query_as(&format!("SELECT {} FROM {} WHERE m.id = ? AND m.creator_id = ?", SELECT, FROM))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Meal record"))
}

/// Log a meal; the time of day is the moment it was logged
pub async fn create(db: &SqlitePool, user_id: &str, fields: MealFields) -> ApiResult<MealRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    sqlx::query(
        "INSERT INTO meal_records (id, meal_type, description, calories, notes, creator_id, date, time, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(fields.meal_type)
    .bind(&fields.description)
    .bind(fields.calories)
    .bind(&fields.notes)
    .bind(user_id)
    .bind(fields.date)
    .bind(now.time())
    .bind(now)
    .execute(db)
    .await?;

    get(db, &id, user_id).await
}

pub async fn update(db: &SqlitePool, id: &str, user_id: &str, fields: MealFields) -> ApiResult<MealRow> {
    sqlx::query(
        "UPDATE meal_records SET meal_type = ?, description = ?, calories = ?, notes = ?, date = ?
         WHERE id = ? AND creator_id = ?",
    )
    .bind(fields.meal_type)
    .bind(&fields.description)
    .bind(fields.calories)
    .bind(&fields.notes)
    .bind(fields.date)
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    get(db, id, user_id).await
}

/// Calories per day within an optional date range, oldest first
///
/// Meals without a calorie count contribute nothing.
pub async fn calories_by_day(
    db: &SqlitePool,
    user_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> ApiResult<Vec<DailyCalories>> {
    Ok(sqlx::query_as(
        "SELECT date, COALESCE(SUM(calories), 0) AS calories FROM meal_records
         WHERE creator_id = ? AND (? IS NULL OR date >= ?) AND (? IS NULL OR date <= ?)
         GROUP BY date ORDER BY date ASC",
    )
    .bind(user_id)
    .bind(start)
    .bind(start)
    .bind(end)
    .bind(end)
    .fetch_all(db)
    .await?)
}
