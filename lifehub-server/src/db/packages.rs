//! Tracked packages and their status history

use chrono::{DateTime, Utc};
use lifehub_common::models::PackageState;
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page};

const SELECT: &str = "p.id, p.tracking_number, p.courier, p.description, p.current_status, p.current_location,
    p.last_update, p.is_delivered, p.has_exception, p.creator_id, p.created_at, p.updated_at";
const FROM: &str = "packages p";

const ORDERING: &[(&str, &str)] = &[
    ("created_at", "p.created_at"),
    ("updated_at", "p.updated_at"),
    ("courier", "p.courier"),
];

/// Couriers offered by the courier search
pub const COURIERS: [&str; 5] = ["SF Express", "YTO Express", "ZTO Express", "Yunda Express", "STO Express"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PackageRow {
    pub id: String,
    pub tracking_number: String,
    pub courier: String,
    pub description: String,
    pub current_status: PackageState,
    pub current_location: String,
    pub last_update: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub has_exception: bool,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PackageStatusRow {
    pub id: String,
    #[serde(rename = "package")]
    pub package_id: String,
    pub time: DateTime<Utc>,
    pub location: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PackageFilter {
    pub current_status: Option<PackageState>,
    pub courier: Option<String>,
}

#[derive(Debug)]
pub struct PackageFields {
    pub tracking_number: String,
    pub courier: String,
    pub description: String,
    pub current_status: PackageState,
    pub current_location: String,
    pub has_exception: bool,
}

/// Case-insensitive substring search over the known couriers
pub fn search_couriers(query: &str) -> Vec<&'static str> {
    let query = query.trim().to_lowercase();
    COURIERS
        .iter()
        .copied()
        .filter(|c| query.is_empty() || c.to_lowercase().contains(&query))
        .collect()
}

pub async fn list(db: &SqlitePool, user_id: &str, filter: PackageFilter, params: &ListParams) -> ApiResult<Page<PackageRow>> {
    let mut c = Conditions::new();
    c.eq("p.creator_id", Some(user_id))
        .eq("p.current_status", filter.current_status.map(|s| s.as_str()))
        .eq("p.courier", filter.courier)
        .search(&["p.tracking_number", "p.description", "p.courier"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), ORDERING, "p.created_at DESC")?;
    pagination::paginate(db, SELECT, FROM, &c, &order, params).await
}

pub async fn get(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<PackageRow> {
    sqlx::query_as(&format!("SELECT {} FROM {} WHERE p.id = ? AND p.creator_id = ?", SELECT, FROM))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Package"))
}

pub async fn create(db: &SqlitePool, user_id: &str, fields: PackageFields) -> ApiResult<PackageRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    sqlx::query(
        "INSERT INTO packages (id, tracking_number, courier, description, current_status, current_location,
            is_delivered, has_exception, creator_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.tracking_number)
    .bind(&fields.courier)
    .bind(&fields.description)
    .bind(fields.current_status)
    .bind(&fields.current_location)
    .bind(fields.current_status == PackageState::Delivered)
    .bind(fields.has_exception)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    get(db, &id, user_id).await
}

pub async fn update(db: &SqlitePool, id: &str, user_id: &str, fields: PackageFields) -> ApiResult<PackageRow> {
    sqlx::query(
        "UPDATE packages SET tracking_number = ?, courier = ?, description = ?, current_status = ?,
            current_location = ?, is_delivered = ?, has_exception = ?, updated_at = ?
         WHERE id = ? AND creator_id = ?",
    )
    .bind(&fields.tracking_number)
    .bind(&fields.courier)
    .bind(&fields.description)
    .bind(fields.current_status)
    .bind(&fields.current_location)
    .bind(fields.current_status == PackageState::Delivered)
    .bind(fields.has_exception)
    .bind(time::now())
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    get(db, id, user_id).await
}

pub async fn history(db: &SqlitePool, package_id: &str) -> ApiResult<Vec<PackageStatusRow>> {
    Ok(sqlx::query_as(
        "SELECT id, package_id, time, location, description, created_at
         FROM package_status WHERE package_id = ? ORDER BY time ASC",
    )
    .bind(package_id)
    .fetch_all(db)
    .await?)
}

/// Move a package one courier stage forward and record the step
///
/// A delivered package is returned unchanged.
pub async fn advance(db: &SqlitePool, package: &PackageRow) -> ApiResult<PackageRow> {
    let Some((next, location)) = package.current_status.advance() else {
        return get(db, &package.id, &package.creator_id).await;
    };
    let now = time::now();

    let mut tx = db.begin().await?;
    sqlx::query(
        "UPDATE packages SET current_status = ?, current_location = ?, last_update = ?, is_delivered = ?,
            updated_at = ?
         WHERE id = ?",
    )
    .bind(next)
    .bind(location)
    .bind(now)
    .bind(next == PackageState::Delivered)
    .bind(now)
    .bind(&package.id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO package_status (id, package_id, time, location, description, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid_utils::generate())
    .bind(&package.id)
    .bind(now)
    .bind(location)
    .bind(format!("Package is now {}", next.as_str().replace('_', " ")))
    .bind(now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    get(db, &package.id, &package.creator_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_couriers() {
        assert_eq!(search_couriers("").len(), COURIERS.len());
        assert_eq!(search_couriers("sf"), vec!["SF Express"]);
        assert_eq!(search_couriers("ZTO"), vec!["ZTO Express"]);
        assert!(search_couriers("post").is_empty());
    }
}
