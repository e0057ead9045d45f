//! Weather, translation and map endpoints
//!
//! Each POST calls a provider and logs the result for the caller. Provider
//! answers are cached across users per request parameters, with the TTL of
//! the service's cache category. A provider failure answers 400 with
//! `{"success": false, "error": ...}` instead of the error envelope.

use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lifehub_common::cache::cache_key;
use lifehub_common::patch::merge;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::db::delete_owned;
use crate::db::services::{
    self, LocationFields, MapFilter, MapLocationRow, TranslationFilter, TranslationRecordRow, WeatherRecordRow,
};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::providers::{Place, ProviderError, Translation, WeatherReport};
use crate::validate;
use crate::AppState;

const WEATHER_UNITS: [&str; 3] = ["metric", "imperial", "kelvin"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/services/weather", get(list_weather).post(query_weather))
        .route("/api/services/weather/:id", get(get_weather).delete(delete_weather))
        .route("/api/services/translation", get(list_translations).post(translate))
        .route(
            "/api/services/translation/:id",
            get(get_translation).delete(delete_translation),
        )
        .route("/api/services/map", get(list_locations).post(search_locations))
        .route("/api/services/map/geocode", post(geocode))
        .route(
            "/api/services/map/:id",
            get(get_location).put(update_location).patch(update_location).delete(delete_location),
        )
}

/// 400 answer for a failed provider call
fn provider_failure(service: &str, err: ProviderError) -> Response {
    warn!("{} provider call failed: {}", service, err);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": err.to_string() })),
    )
        .into_response()
}

// Weather

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherRequest {
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default = "default_units")]
    pub units: String,
}

fn default_units() -> String {
    "metric".to_string()
}

pub async fn list_weather(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<WeatherQuery>,
) -> ApiResult<Json<Page<WeatherRecordRow>>> {
    Ok(Json(services::list_weather(&state.db, &user.id, query.city.as_deref(), &params).await?))
}

/// POST /api/services/weather
pub async fn query_weather(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<WeatherRequest>,
) -> ApiResult<Response> {
    let city = validate::required_text("city", &req.city, 100)?;
    validate::max_len("country", &req.country, 50)?;
    if !WEATHER_UNITS.contains(&req.units.as_str()) {
        return Err(ApiError::field("units", format!("'{}' is not a valid choice", req.units)));
    }
    let country = req.country.trim().to_string();

    let key = cache_key(
        "weather",
        &[city.to_lowercase().as_str(), country.to_lowercase().as_str(), req.units.as_str()],
        &[],
    );
    let ttl = state.config.cache.for_category("weather");
    let provider = state.providers.weather.clone();
    let city_ref = city.as_str();
    let country_ref = Some(country.as_str()).filter(|c| !c.is_empty());
    let units = req.units.as_str();
    let report: Result<WeatherReport, ProviderError> = state
        .cache
        .get_or_set(&key, Some(ttl), || async move { provider.current(city_ref, country_ref, units).await })
        .await;

    match report {
        Ok(report) => {
            let record = services::save_weather(&state.db, &user.id, &report).await?;
            Ok((StatusCode::CREATED, Json(record)).into_response())
        }
        Err(e) => Ok(provider_failure("Weather", e)),
    }
}

pub async fn get_weather(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<WeatherRecordRow>> {
    Ok(Json(services::get_weather(&state.db, &id, &user.id).await?))
}

pub async fn delete_weather(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "weather_records", "user_id", &id, &user.id, "Weather record").await?;
    Ok(StatusCode::NO_CONTENT)
}

// Translation

#[derive(Debug, Deserialize)]
pub struct TranslationQuery {
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    #[serde(default = "default_source")]
    pub source_language: String,
    pub target_language: String,
}

fn default_source() -> String {
    "auto".to_string()
}

pub async fn list_translations(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<TranslationQuery>,
) -> ApiResult<Json<Page<TranslationRecordRow>>> {
    let filter = TranslationFilter {
        source_language: query.source_language,
        target_language: query.target_language,
        keyword: query.keyword,
    };
    Ok(Json(services::list_translations(&state.db, &user.id, filter, &params).await?))
}

/// POST /api/services/translation
pub async fn translate(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<TranslationRequest>,
) -> ApiResult<Response> {
    let text = validate::required_text("text", &req.text, 5000)?;
    let source = validate::required_text("source_language", &req.source_language, 10)?;
    let target = validate::required_text("target_language", &req.target_language, 10)?;

    let key = cache_key("translation", &[source.as_str(), target.as_str(), text.as_str()], &[]);
    let ttl = state.config.cache.for_category("translation");
    let provider = state.providers.translation.clone();
    let (text_ref, source_ref, target_ref) = (text.as_str(), source.as_str(), target.as_str());
    let started = Instant::now();
    let result: Result<Translation, ProviderError> = state
        .cache
        .get_or_set(&key, Some(ttl), || async move { provider.translate(text_ref, source_ref, target_ref).await })
        .await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(translation) => {
            let record = services::save_translation(&state.db, &user.id, &text, &translation, elapsed).await?;
            Ok((StatusCode::CREATED, Json(record)).into_response())
        }
        Err(e) => Ok(provider_failure("Translation", e)),
    }
}

pub async fn get_translation(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<TranslationRecordRow>> {
    Ok(Json(services::get_translation(&state.db, &id, &user.id).await?))
}

pub async fn delete_translation(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "translation_records", "user_id", &id, &user.id, "Translation record").await?;
    Ok(StatusCode::NO_CONTENT)
}

// Map

#[derive(Debug, Deserialize)]
pub struct MapQuery {
    pub city: Option<String>,
    pub location_type: Option<String>,
    pub category: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub city: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocation {
    pub name: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub location_type: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub search_results: Vec<Place>,
    pub saved_locations: Vec<MapLocationRow>,
    pub total_found: usize,
    pub saved_count: usize,
}

pub async fn list_locations(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<MapQuery>,
) -> ApiResult<Json<Page<MapLocationRow>>> {
    let filter = MapFilter {
        city: query.city,
        location_type: query.location_type,
        category: query.category,
        keyword: query.keyword,
    };
    Ok(Json(services::list_locations(&state.db, &user.id, filter, &params).await?))
}

/// POST /api/services/map
///
/// Every search result is saved as a location; a row that fails to save is
/// skipped.
pub async fn search_locations(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<SearchRequest>,
) -> ApiResult<Response> {
    let query = validate::required_text("query", &req.query, 200)?;
    let city = req.city.unwrap_or_default().trim().to_string();
    let region = req.region.unwrap_or_default().trim().to_string();

    let key = cache_key("map_location", &["search", query.as_str()], &[("city", city.as_str()), ("region", region.as_str())]);
    let ttl = state.config.cache.for_category("map_location");
    let geocoder = state.providers.geocoder.clone();
    let query_ref = query.as_str();
    let city_ref = Some(city.as_str()).filter(|c| !c.is_empty());
    let region_ref = Some(region.as_str()).filter(|r| !r.is_empty());
    let found: Result<(Vec<Place>, Value), ProviderError> = state
        .cache
        .get_or_set(&key, Some(ttl), || async move { geocoder.search(query_ref, city_ref, region_ref).await })
        .await;

    let (places, api_response) = match found {
        Ok(found) => found,
        Err(e) => return Ok(provider_failure("Map", e)),
    };

    let mut saved_locations = Vec::with_capacity(places.len());
    for place in &places {
        match services::save_location(&state.db, &user.id, place, &api_response).await {
            Ok(row) => saved_locations.push(row),
            Err(e) => warn!("Skipping search result '{}': {}", place.name, e),
        }
    }

    Ok(Json(SearchResponse {
        total_found: places.len(),
        saved_count: saved_locations.len(),
        search_results: places,
        saved_locations,
    })
    .into_response())
}

/// POST /api/services/map/geocode
pub async fn geocode(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<GeocodeRequest>,
) -> ApiResult<Response> {
    let address = validate::required_text("address", &req.address, 500)?;

    let key = cache_key("map_location", &["geocode", address.as_str()], &[]);
    let ttl = state.config.cache.for_category("map_location");
    let geocoder = state.providers.geocoder.clone();
    let address_ref = address.as_str();
    let found: Result<(Place, Value), ProviderError> = state
        .cache
        .get_or_set(&key, Some(ttl), || async move { geocoder.geocode(address_ref).await })
        .await;

    match found {
        Ok((place, api_response)) => {
            let row = services::save_location(&state.db, &user.id, &place, &api_response).await?;
            Ok((StatusCode::CREATED, Json(row)).into_response())
        }
        Err(e) => Ok(provider_failure("Map", e)),
    }
}

pub async fn get_location(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<MapLocationRow>> {
    Ok(Json(services::get_location(&state.db, &id, &user.id).await?))
}

pub async fn update_location(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateLocation>,
) -> ApiResult<Json<MapLocationRow>> {
    let current = services::get_location(&state.db, &id, &user.id).await?;
    let fields = LocationFields {
        name: validate::required_text("name", &merge(current.name, req.name), 200)?,
        description: merge(current.description, req.description),
        latitude: merge(current.latitude, req.latitude),
        longitude: merge(current.longitude, req.longitude),
        address: merge(current.address, req.address),
        city: merge(current.city, req.city),
        province: merge(current.province, req.province),
        country: merge(current.country, req.country),
        postal_code: merge(current.postal_code, req.postal_code),
        location_type: merge(current.location_type, req.location_type),
        category: merge(current.category, req.category),
        tags: merge(current.tags.0, req.tags),
        metadata: merge(current.metadata.0, req.metadata),
    };
    if !(-90.0..=90.0).contains(&fields.latitude) {
        return Err(ApiError::field("latitude", "Ensure this value is between -90 and 90."));
    }
    if !(-180.0..=180.0).contains(&fields.longitude) {
        return Err(ApiError::field("longitude", "Ensure this value is between -180 and 180."));
    }
    if !fields.metadata.is_object() {
        return Err(ApiError::field("metadata", "Expected a JSON object"));
    }
    Ok(Json(services::update_location(&state.db, &id, &user.id, fields).await?))
}

pub async fn delete_location(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "map_locations", "user_id", &id, &user.id, "Location").await?;
    Ok(StatusCode::NO_CONTENT)
}
