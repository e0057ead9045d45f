//! Household items with optional expiry dates

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use lifehub_common::formulas::is_expired;
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page};

const SELECT: &str = "i.id, i.name, i.category, i.quantity, i.location, i.expiry_date, i.is_expired,
    i.description, i.creator_id, i.created_at, i.updated_at";
const FROM: &str = "items i";

const ORDERING: &[(&str, &str)] = &[
    ("name", "i.name"),
    ("expiry_date", "i.expiry_date"),
    ("quantity", "i.quantity"),
    ("created_at", "i.created_at"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ItemRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub location: String,
    pub expiry_date: Option<NaiveDate>,
    pub is_expired: bool,
    pub description: String,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ItemFilter {
    pub category: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug)]
pub struct ItemFields {
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub location: String,
    pub expiry_date: Option<NaiveDate>,
    pub description: String,
}

fn owned(user_id: &str) -> Conditions {
    let mut c = Conditions::new();
    c.eq("i.creator_id", Some(user_id));
    c
}

pub async fn list(db: &SqlitePool, user_id: &str, filter: ItemFilter, params: &ListParams) -> ApiResult<Page<ItemRow>> {
    let mut c = owned(user_id);
    c.eq("i.category", filter.category)
        .eq("i.location", filter.location)
        .search(&["i.name", "i.description"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), ORDERING, "i.name ASC")?;
    pagination::paginate(db, SELECT, FROM, &c, &order, params).await
}

pub async fn get(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<ItemRow> {
    sqlx::query_as(&format!("SELECT {} FROM {} WHERE i.id = ? AND i.creator_id = ?", SELECT, FROM))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Item"))
}

pub async fn create(db: &SqlitePool, user_id: &str, fields: ItemFields) -> ApiResult<ItemRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    sqlx::query(
        "INSERT INTO items (id, name, category, quantity, location, expiry_date, is_expired, description,
            creator_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.name)
    .bind(&fields.category)
    .bind(fields.quantity)
    .bind(&fields.location)
    .bind(fields.expiry_date)
    .bind(is_expired(fields.expiry_date, time::today()))
    .bind(&fields.description)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    get(db, &id, user_id).await
}

pub async fn update(db: &SqlitePool, id: &str, user_id: &str, fields: ItemFields) -> ApiResult<ItemRow> {
    sqlx::query(
        "UPDATE items SET name = ?, category = ?, quantity = ?, location = ?, expiry_date = ?, is_expired = ?,
            description = ?, updated_at = ?
         WHERE id = ? AND creator_id = ?",
    )
    .bind(&fields.name)
    .bind(&fields.category)
    .bind(fields.quantity)
    .bind(&fields.location)
    .bind(fields.expiry_date)
    .bind(is_expired(fields.expiry_date, time::today()))
    .bind(&fields.description)
    .bind(time::now())
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    get(db, id, user_id).await
}

/// Items expiring between `from` and `to`, both inclusive, soonest first
pub async fn expiring_between(db: &SqlitePool, user_id: &str, from: NaiveDate, to: NaiveDate) -> ApiResult<Vec<ItemRow>> {
    let mut c = owned(user_id);
    c.cmp("i.expiry_date", ">=", Some(from)).cmp("i.expiry_date", "<=", Some(to));
    pagination::fetch_all(db, SELECT, FROM, &c, "i.expiry_date ASC").await
}

/// Total quantity per category
pub async fn category_totals(db: &SqlitePool, user_id: &str) -> ApiResult<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT category, COALESCE(SUM(quantity), 0) FROM items WHERE creator_id = ? GROUP BY category",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().collect())
}
