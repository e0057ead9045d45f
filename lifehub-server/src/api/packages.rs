//! Package tracking endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lifehub_common::models::PackageState;
use lifehub_common::patch::merge;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::db::delete_owned;
use crate::db::packages::{self, PackageFields, PackageFilter, PackageRow, PackageStatusRow};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::validate;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/life/packages", get(list_packages).post(create_package))
        .route("/api/life/packages/search_courier", get(search_courier))
        .route(
            "/api/life/packages/:id",
            get(get_package).put(update_package).patch(update_package).delete(delete_package),
        )
        .route("/api/life/packages/:id/tracking", get(tracking))
        .route("/api/life/packages/:id/refresh_tracking", post(refresh_tracking))
}

#[derive(Debug, Deserialize)]
pub struct PackageQuery {
    pub current_status: Option<PackageState>,
    pub courier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CourierQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePackage {
    pub tracking_number: String,
    pub courier: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_state")]
    pub current_status: PackageState,
    #[serde(default)]
    pub current_location: String,
    #[serde(default)]
    pub has_exception: bool,
}

fn default_state() -> PackageState {
    PackageState::Pending
}

#[derive(Debug, Deserialize)]
pub struct UpdatePackage {
    pub tracking_number: Option<String>,
    pub courier: Option<String>,
    pub description: Option<String>,
    pub current_status: Option<PackageState>,
    pub current_location: Option<String>,
    pub has_exception: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TrackingResponse {
    pub tracking_info: Vec<Value>,
    pub current_status: PackageState,
    pub current_location: String,
}

fn check_fields(fields: PackageFields) -> ApiResult<PackageFields> {
    validate::max_len("description", &fields.description, 200)?;
    validate::max_len("current_location", &fields.current_location, 200)?;
    Ok(PackageFields {
        tracking_number: validate::required_text("tracking_number", &fields.tracking_number, 100)?,
        courier: validate::required_text("courier", &fields.courier, 50)?,
        ..fields
    })
}

pub async fn list_packages(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<PackageQuery>,
) -> ApiResult<Json<Page<PackageRow>>> {
    let filter = PackageFilter {
        current_status: query.current_status,
        courier: query.courier,
    };
    Ok(Json(packages::list(&state.db, &user.id, filter, &params).await?))
}

pub async fn create_package(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreatePackage>,
) -> ApiResult<(StatusCode, Json<PackageRow>)> {
    let fields = check_fields(PackageFields {
        tracking_number: req.tracking_number,
        courier: req.courier,
        description: req.description,
        current_status: req.current_status,
        current_location: req.current_location,
        has_exception: req.has_exception,
    })?;
    let package = packages::create(&state.db, &user.id, fields).await?;
    info!("Tracking package {} for {}", package.tracking_number, user.username);
    Ok((StatusCode::CREATED, Json(package)))
}

pub async fn get_package(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<PackageRow>> {
    Ok(Json(packages::get(&state.db, &id, &user.id).await?))
}

pub async fn update_package(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdatePackage>,
) -> ApiResult<Json<PackageRow>> {
    let current = packages::get(&state.db, &id, &user.id).await?;
    let fields = check_fields(PackageFields {
        tracking_number: merge(current.tracking_number, req.tracking_number),
        courier: merge(current.courier, req.courier),
        description: merge(current.description, req.description),
        current_status: merge(current.current_status, req.current_status),
        current_location: merge(current.current_location, req.current_location),
        has_exception: merge(current.has_exception, req.has_exception),
    })?;
    Ok(Json(packages::update(&state.db, &id, &user.id, fields).await?))
}

pub async fn delete_package(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "packages", "creator_id", &id, &user.id, "Package").await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/life/packages/:id/tracking
///
/// The shipment entry comes first, followed by every recorded step.
pub async fn tracking(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<TrackingResponse>> {
    let package = packages::get(&state.db, &id, &user.id).await?;
    let history: Vec<PackageStatusRow> = packages::history(&state.db, &package.id).await?;

    let mut tracking_info = vec![serde_json::json!({
        "time": package.created_at,
        "location": "Origin",
        "status": "shipped",
        "description": format!("Picked up by {}", package.courier),
    })];
    tracking_info.extend(history.into_iter().map(|step| {
        serde_json::json!({
            "time": step.time,
            "location": step.location,
            "description": step.description,
        })
    }));

    Ok(Json(TrackingResponse {
        tracking_info,
        current_status: package.current_status,
        current_location: package.current_location,
    }))
}

/// POST /api/life/packages/:id/refresh_tracking
pub async fn refresh_tracking(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<PackageRow>> {
    let package = packages::get(&state.db, &id, &user.id).await?;
    Ok(Json(packages::advance(&state.db, &package).await?))
}

/// GET /api/life/packages/search_courier
pub async fn search_courier(ApiQuery(query): ApiQuery<CourierQuery>) -> Json<Vec<&'static str>> {
    Json(packages::search_couriers(&query.query))
}
