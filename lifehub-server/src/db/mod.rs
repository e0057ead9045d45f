//! SQL repositories, one module per resource group
//!
//! Every owned table is filtered by its real owner column; a row owned by
//! someone else reads as missing.

pub mod calendar;
pub mod finance;
pub mod habits;
pub mod items;
pub mod knowledge;
pub mod meals;
pub mod ocr;
pub mod packages;
pub mod projects;
pub mod services;
pub mod tasks;
pub mod tracking;
pub mod users;

use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};

/// Fail with 404 unless `id` exists in `table` and belongs to `user_id`
///
/// Table and column names are compile-time constants, never user input.
pub async fn ensure_owned(
    db: &SqlitePool,
    table: &str,
    owner_column: &str,
    id: &str,
    user_id: &str,
    what: &str,
) -> ApiResult<()> {
    let found: Option<i64> = sqlx::query_scalar(&format!(
        "SELECT 1 FROM {} WHERE id = ? AND {} = ?",
        table, owner_column
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found(what)),
    }
}

/// Delete an owned row, 404 when nothing matched
pub async fn delete_owned(
    db: &SqlitePool,
    table: &str,
    owner_column: &str,
    id: &str,
    user_id: &str,
    what: &str,
) -> ApiResult<()> {
    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE id = ? AND {} = ?",
        table, owner_column
    ))
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found(what));
    }
    Ok(())
}

/// Keep only tag ids owned by `user_id`
pub async fn owned_tag_ids(db: &SqlitePool, user_id: &str, tag_ids: &[String]) -> ApiResult<Vec<String>> {
    let mut owned = Vec::with_capacity(tag_ids.len());
    for tag_id in tag_ids {
        let found: Option<String> =
            sqlx::query_scalar("SELECT id FROM tags WHERE id = ? AND creator_id = ?")
                .bind(tag_id)
                .bind(user_id)
                .fetch_optional(db)
                .await?;
        match found {
            Some(id) if !owned.contains(&id) => owned.push(id),
            Some(_) => {}
            None => {
                return Err(ApiError::field("tag_ids", format!("Invalid tag \"{}\"", tag_id)));
            }
        }
    }
    Ok(owned)
}
