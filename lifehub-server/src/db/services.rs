//! Logs of third-party service calls

use chrono::{DateTime, Utc};
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use serde_json::Value;
use sqlx::{types::Json, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page, SqlValue};
use crate::providers::{Place, Translation, WeatherReport};

// Weather

const WEATHER_SELECT: &str = "w.id, w.user_id, w.city, w.country, w.temperature, w.feels_like, w.humidity,
    w.pressure, w.wind_speed, w.wind_direction, w.visibility, w.weather_main, w.weather_description,
    w.weather_icon, w.sunrise, w.sunset, w.data_time, w.provider, w.created_at";
const WEATHER_FROM: &str = "weather_records w";

const WEATHER_ORDERING: &[(&str, &str)] = &[
    ("created_at", "w.created_at"),
    ("data_time", "w.data_time"),
    ("city", "w.city"),
    ("temperature", "w.temperature"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WeatherRecordRow {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    pub city: String,
    pub country: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: i64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_direction: i64,
    pub visibility: Option<f64>,
    pub weather_main: String,
    pub weather_description: String,
    pub weather_icon: String,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub data_time: DateTime<Utc>,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

/// Case-insensitive substring filter on one column
fn contains(c: &mut Conditions, column: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        c.push(
            &format!("LOWER({}) LIKE ? ESCAPE '\\'", column),
            [SqlValue::from(pagination::like_pattern(v))],
        );
    }
}

pub async fn list_weather(
    db: &SqlitePool,
    user_id: &str,
    city: Option<&str>,
    params: &ListParams,
) -> ApiResult<Page<WeatherRecordRow>> {
    let mut c = Conditions::new();
    c.eq("w.user_id", Some(user_id));
    contains(&mut c, "w.city", city);
    let order = pagination::order_by(params.ordering.as_deref(), WEATHER_ORDERING, "w.created_at DESC")?;
    pagination::paginate(db, WEATHER_SELECT, WEATHER_FROM, &c, &order, params).await
}

pub async fn get_weather(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<WeatherRecordRow> {
    sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE w.id = ? AND w.user_id = ?",
        WEATHER_SELECT, WEATHER_FROM
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Weather record"))
}

pub async fn save_weather(db: &SqlitePool, user_id: &str, report: &WeatherReport) -> ApiResult<WeatherRecordRow> {
    let id = uuid_utils::generate();
    sqlx::query(
        "INSERT INTO weather_records (id, user_id, city, country, temperature, feels_like, humidity, pressure,
            wind_speed, wind_direction, visibility, weather_main, weather_description, weather_icon, sunrise,
            sunset, data_time, provider, api_response, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(&report.city)
    .bind(&report.country)
    .bind(report.temperature)
    .bind(report.feels_like)
    .bind(report.humidity)
    .bind(report.pressure)
    .bind(report.wind_speed)
    .bind(report.wind_direction)
    .bind(report.visibility)
    .bind(&report.weather_main)
    .bind(&report.weather_description)
    .bind(&report.weather_icon)
    .bind(report.sunrise)
    .bind(report.sunset)
    .bind(report.data_time)
    .bind(&report.provider)
    .bind(Json(&report.api_response))
    .bind(time::now())
    .execute(db)
    .await?;

    get_weather(db, &id, user_id).await
}

// Translation

const TRANSLATION_SELECT: &str = "r.id, r.user_id, r.source_text, r.target_text, r.source_language,
    r.target_language, r.provider, r.confidence, r.processing_time, r.created_at";
const TRANSLATION_FROM: &str = "translation_records r";

const TRANSLATION_ORDERING: &[(&str, &str)] = &[("created_at", "r.created_at"), ("provider", "r.provider")];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TranslationRecordRow {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    pub source_text: String,
    pub target_text: String,
    pub source_language: String,
    pub target_language: String,
    pub provider: String,
    pub confidence: Option<f64>,
    pub processing_time: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TranslationFilter {
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub keyword: Option<String>,
}

pub async fn list_translations(
    db: &SqlitePool,
    user_id: &str,
    filter: TranslationFilter,
    params: &ListParams,
) -> ApiResult<Page<TranslationRecordRow>> {
    let mut c = Conditions::new();
    c.eq("r.user_id", Some(user_id))
        .eq("r.source_language", filter.source_language)
        .eq("r.target_language", filter.target_language)
        .search(
            &["r.source_text", "r.target_text"],
            filter.keyword.as_deref().or(params.search_term()),
        );
    let order = pagination::order_by(params.ordering.as_deref(), TRANSLATION_ORDERING, "r.created_at DESC")?;
    pagination::paginate(db, TRANSLATION_SELECT, TRANSLATION_FROM, &c, &order, params).await
}

pub async fn get_translation(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<TranslationRecordRow> {
    sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE r.id = ? AND r.user_id = ?",
        TRANSLATION_SELECT, TRANSLATION_FROM
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Translation record"))
}

pub async fn save_translation(
    db: &SqlitePool,
    user_id: &str,
    source_text: &str,
    result: &Translation,
    processing_time: f64,
) -> ApiResult<TranslationRecordRow> {
    let id = uuid_utils::generate();
    sqlx::query(
        "INSERT INTO translation_records (id, user_id, source_text, target_text, source_language, target_language,
            provider, confidence, processing_time, api_response, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(source_text)
    .bind(&result.translated_text)
    .bind(&result.source_language)
    .bind(&result.target_language)
    .bind(&result.provider)
    .bind(result.confidence)
    .bind(processing_time)
    .bind(Json(&result.api_response))
    .bind(time::now())
    .execute(db)
    .await?;

    get_translation(db, &id, user_id).await
}

// Map locations

const MAP_SELECT: &str = "l.id, l.user_id, l.name, l.description, l.latitude, l.longitude, l.address, l.city,
    l.province, l.country, l.postal_code, l.location_type, l.category, l.provider, l.tags, l.metadata,
    l.created_at, l.updated_at";
const MAP_FROM: &str = "map_locations l";

const MAP_ORDERING: &[(&str, &str)] = &[
    ("created_at", "l.created_at"),
    ("updated_at", "l.updated_at"),
    ("name", "l.name"),
    ("city", "l.city"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MapLocationRow {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub postal_code: String,
    pub location_type: String,
    pub category: String,
    pub provider: String,
    pub tags: Json<Vec<String>>,
    pub metadata: Json<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MapFilter {
    pub city: Option<String>,
    pub location_type: Option<String>,
    pub category: Option<String>,
    pub keyword: Option<String>,
}

/// Owner-editable fields of a saved location
#[derive(Debug)]
pub struct LocationFields {
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub postal_code: String,
    pub location_type: String,
    pub category: String,
    pub tags: Vec<String>,
    pub metadata: Value,
}

pub async fn list_locations(
    db: &SqlitePool,
    user_id: &str,
    filter: MapFilter,
    params: &ListParams,
) -> ApiResult<Page<MapLocationRow>> {
    let mut c = Conditions::new();
    c.eq("l.user_id", Some(user_id));
    contains(&mut c, "l.city", filter.city.as_deref());
    contains(&mut c, "l.location_type", filter.location_type.as_deref());
    contains(&mut c, "l.category", filter.category.as_deref());
    c.search(
        &["l.name", "l.address", "l.description"],
        filter.keyword.as_deref().or(params.search_term()),
    );
    let order = pagination::order_by(params.ordering.as_deref(), MAP_ORDERING, "l.created_at DESC")?;
    pagination::paginate(db, MAP_SELECT, MAP_FROM, &c, &order, params).await
}

pub async fn get_location(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<MapLocationRow> {
    sqlx::query_as(&format!("SELECT {} FROM {} WHERE l.id = ? AND l.user_id = ?", MAP_SELECT, MAP_FROM))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Location"))
}

pub async fn save_location(
    db: &SqlitePool,
    user_id: &str,
    place: &Place,
    api_response: &Value,
) -> ApiResult<MapLocationRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    sqlx::query(
        "INSERT INTO map_locations (id, user_id, name, latitude, longitude, address, city, province, country,
            postal_code, location_type, category, provider, api_response, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(&place.name)
    .bind(place.latitude)
    .bind(place.longitude)
    .bind(&place.address)
    .bind(&place.city)
    .bind(&place.province)
    .bind(&place.country)
    .bind(&place.postal_code)
    .bind(&place.location_type)
    .bind(&place.category)
    .bind(&place.provider)
    .bind(Json(api_response))
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    get_location(db, &id, user_id).await
}

pub async fn update_location(
    db: &SqlitePool,
    id: &str,
    user_id: &str,
    fields: LocationFields,
) -> ApiResult<MapLocationRow> {
    sqlx::query(
        "UPDATE map_locations SET name = ?, description = ?, latitude = ?, longitude = ?, address = ?, city = ?,
            province = ?, country = ?, postal_code = ?, location_type = ?, category = ?, tags = ?, metadata = ?,
            updated_at = ?
         WHERE id = ? AND user_id = ?",
    )
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.latitude)
    .bind(fields.longitude)
    .bind(&fields.address)
    .bind(&fields.city)
    .bind(&fields.province)
    .bind(&fields.country)
    .bind(&fields.postal_code)
    .bind(&fields.location_type)
    .bind(&fields.category)
    .bind(Json(&fields.tags))
    .bind(Json(&fields.metadata))
    .bind(time::now())
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    get_location(db, id, user_id).await
}
