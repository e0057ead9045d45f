//! Meal log endpoints

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::NaiveDate;
use lifehub_common::models::MealType;
use lifehub_common::patch::{deserialize_some, merge};
use lifehub_common::time;
use serde::Deserialize;

use crate::db::delete_owned;
use crate::db::meals::{self, DailyCalories, MealFields, MealRow};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::validate;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/life/meals", get(list_meals).post(create_meal))
        .route("/api/life/meals/today_meals", get(today_meals))
        .route("/api/life/meals/calories_summary", get(calories_summary))
        .route(
            "/api/life/meals/:id",
            get(get_meal).put(update_meal).patch(update_meal).delete(delete_meal),
        )
}

#[derive(Debug, Deserialize)]
pub struct MealQuery {
    pub meal_type: Option<MealType>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMeal {
    pub meal_type: MealType,
    pub description: String,
    pub calories: Option<i64>,
    #[serde(default)]
    pub notes: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeal {
    pub meal_type: Option<MealType>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub calories: Option<Option<i64>>,
    pub notes: Option<String>,
    pub date: Option<NaiveDate>,
}

fn check_fields(fields: MealFields) -> ApiResult<MealFields> {
    if let Some(calories) = fields.calories {
        validate::non_negative("calories", calories as f64)?;
    }
    Ok(MealFields {
        description: validate::required_text("description", &fields.description, 200)?,
        ..fields
    })
}

pub async fn list_meals(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<MealQuery>,
) -> ApiResult<Json<Page<MealRow>>> {
    Ok(Json(meals::list(&state.db, &user.id, query.meal_type, &params).await?))
}

pub async fn create_meal(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateMeal>,
) -> ApiResult<(StatusCode, Json<MealRow>)> {
    let fields = check_fields(MealFields {
        meal_type: req.meal_type,
        description: req.description,
        calories: req.calories,
        notes: req.notes,
        date: req.date.unwrap_or_else(time::today),
    })?;
    Ok((StatusCode::CREATED, Json(meals::create(&state.db, &user.id, fields).await?)))
}

pub async fn get_meal(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<MealRow>> {
    Ok(Json(meals::get(&state.db, &id, &user.id).await?))
}

pub async fn update_meal(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateMeal>,
) -> ApiResult<Json<MealRow>> {
    let current = meals::get(&state.db, &id, &user.id).await?;
    let fields = check_fields(MealFields {
        meal_type: merge(current.meal_type, req.meal_type),
        description: merge(current.description, req.description),
        calories: merge(current.calories, req.calories),
        notes: merge(current.notes, req.notes),
        date: merge(current.date, req.date),
    })?;
    Ok(Json(meals::update(&state.db, &id, &user.id, fields).await?))
}

pub async fn delete_meal(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "meal_records", "creator_id", &id, &user.id, "Meal record").await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/life/meals/today_meals
pub async fn today_meals(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<MealRow>>> {
    Ok(Json(meals::on_date(&state.db, &user.id, time::today()).await?))
}

/// GET /api/life/meals/calories_summary
pub async fn calories_summary(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> ApiResult<Json<Vec<DailyCalories>>> {
    if let (Some(start), Some(end)) = (range.start_date, range.end_date) {
        if end < start {
            return Err(ApiError::field("end_date", "End date must not be before start date"));
        }
    }
    Ok(Json(meals::calories_by_day(&state.db, &user.id, range.start_date, range.end_date).await?))
}
