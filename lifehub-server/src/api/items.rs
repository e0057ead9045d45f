//! Item inventory endpoints

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{Duration, NaiveDate};
use lifehub_common::patch::{deserialize_some, merge};
use lifehub_common::time;
use serde::Deserialize;

use crate::db::delete_owned;
use crate::db::items::{self, ItemFields, ItemFilter, ItemRow};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::validate;
use crate::AppState;

/// Days ahead covered by the expiring-soon list
const EXPIRY_WINDOW_DAYS: i64 = 3;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/life/items", get(list_items).post(create_item))
        .route("/api/life/items/expiring_soon", get(expiring_soon))
        .route("/api/life/items/category_stats", get(category_stats))
        .route(
            "/api/life/items/:id",
            get(get_item).put(update_item).patch(update_item).delete(delete_item),
        )
}

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub category: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateItem {
    pub name: String,
    pub category: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub location: String,
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItem {
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<i64>,
    pub location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub expiry_date: Option<Option<NaiveDate>>,
    pub description: Option<String>,
}

fn check_fields(fields: ItemFields) -> ApiResult<ItemFields> {
    if fields.quantity < 0 {
        return Err(ApiError::field("quantity", "Ensure this value is greater than or equal to 0."));
    }
    validate::max_len("location", &fields.location, 100)?;
    Ok(ItemFields {
        name: validate::required_text("name", &fields.name, 200)?,
        category: validate::required_text("category", &fields.category, 50)?,
        ..fields
    })
}

pub async fn list_items(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<ItemQuery>,
) -> ApiResult<Json<Page<ItemRow>>> {
    let filter = ItemFilter {
        category: query.category,
        location: query.location,
    };
    Ok(Json(items::list(&state.db, &user.id, filter, &params).await?))
}

pub async fn create_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateItem>,
) -> ApiResult<(StatusCode, Json<ItemRow>)> {
    let fields = check_fields(ItemFields {
        name: req.name,
        category: req.category,
        quantity: req.quantity,
        location: req.location,
        expiry_date: req.expiry_date,
        description: req.description,
    })?;
    Ok((StatusCode::CREATED, Json(items::create(&state.db, &user.id, fields).await?)))
}

pub async fn get_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<ItemRow>> {
    Ok(Json(items::get(&state.db, &id, &user.id).await?))
}

pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateItem>,
) -> ApiResult<Json<ItemRow>> {
    let current = items::get(&state.db, &id, &user.id).await?;
    let fields = check_fields(ItemFields {
        name: merge(current.name, req.name),
        category: merge(current.category, req.category),
        quantity: merge(current.quantity, req.quantity),
        location: merge(current.location, req.location),
        expiry_date: merge(current.expiry_date, req.expiry_date),
        description: merge(current.description, req.description),
    })?;
    Ok(Json(items::update(&state.db, &id, &user.id, fields).await?))
}

pub async fn delete_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "items", "creator_id", &id, &user.id, "Item").await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/life/items/expiring_soon
pub async fn expiring_soon(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<ItemRow>>> {
    let today = time::today();
    let until = today + Duration::days(EXPIRY_WINDOW_DAYS);
    Ok(Json(items::expiring_between(&state.db, &user.id, today, until).await?))
}

/// GET /api/life/items/category_stats
pub async fn category_stats(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<BTreeMap<String, i64>>> {
    Ok(Json(items::category_totals(&state.db, &user.id).await?))
}
