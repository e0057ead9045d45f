//! Transaction and budget endpoints

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use lifehub_common::formulas::round1;
use lifehub_common::models::{BudgetCategory, BudgetPeriod, TransactionCategory, TransactionType};
use lifehub_common::patch::{deserialize_some, merge};
use lifehub_common::time;
use serde::{Deserialize, Serialize};

use crate::db::finance::{
    self, BudgetFields, BudgetFilter, BudgetRow, TransactionFields, TransactionFilter, TransactionRow,
};
use crate::db::{delete_owned, ensure_owned};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::validate;
use crate::AppState;

/// Days covered by the transaction summary trend
const TREND_DAYS: i64 = 30;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/life/transactions", get(list_transactions).post(create_transaction))
        .route("/api/life/transactions/summary", get(transaction_summary))
        .route(
            "/api/life/transactions/:id",
            get(get_transaction)
                .put(update_transaction)
                .patch(update_transaction)
                .delete(delete_transaction),
        )
        .route("/api/life/budgets", get(list_budgets).post(create_budget))
        .route("/api/life/budgets/current_month", get(current_month))
        .route("/api/life/budgets/summary", get(budget_summary))
        .route(
            "/api/life/budgets/:id",
            get(get_budget).put(update_budget).patch(update_budget).delete(delete_budget),
        )
}

// Transactions

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    pub category: Option<TransactionCategory>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransaction {
    pub amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub category: TransactionCategory,
    pub description: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub budget: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTransaction {
    pub amount: Option<f64>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    pub category: Option<TransactionCategory>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub time: Option<Option<NaiveTime>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub budget: Option<Option<String>>,
}

async fn check_transaction(state: &AppState, user: &AuthUser, fields: TransactionFields) -> ApiResult<TransactionFields> {
    validate::positive("amount", fields.amount)?;
    if let Some(budget_id) = &fields.budget_id {
        ensure_owned(&state.db, "budgets", "creator_id", budget_id, &user.id, "Budget")
            .await
            .map_err(|_| ApiError::field("budget", format!("Invalid pk \"{}\" - object does not exist.", budget_id)))?;
    }
    Ok(TransactionFields {
        description: validate::required_text("description", &fields.description, 200)?,
        ..fields
    })
}

pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<TransactionQuery>,
) -> ApiResult<Json<Page<TransactionRow>>> {
    let filter = TransactionFilter {
        transaction_type: query.transaction_type,
        category: query.category,
    };
    Ok(Json(finance::list_transactions(&state.db, &user.id, filter, &params).await?))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateTransaction>,
) -> ApiResult<(StatusCode, Json<TransactionRow>)> {
    let fields = TransactionFields {
        amount: req.amount,
        transaction_type: req.transaction_type,
        category: req.category,
        description: req.description,
        date: req.date.unwrap_or_else(time::today),
        time: req.time,
        budget_id: req.budget,
    };
    let fields = check_transaction(&state, &user, fields).await?;
    Ok((StatusCode::CREATED, Json(finance::create_transaction(&state.db, &user.id, fields).await?)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<TransactionRow>> {
    Ok(Json(finance::get_transaction(&state.db, &id, &user.id).await?))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateTransaction>,
) -> ApiResult<Json<TransactionRow>> {
    let current = finance::get_transaction(&state.db, &id, &user.id).await?;
    let fields = TransactionFields {
        amount: merge(current.amount, req.amount),
        transaction_type: merge(current.transaction_type, req.transaction_type),
        category: merge(current.category, req.category),
        description: merge(current.description.clone(), req.description),
        date: merge(current.date, req.date),
        time: merge(current.time, req.time),
        budget_id: merge(current.budget_id.clone(), req.budget),
    };
    let fields = check_transaction(&state, &user, fields).await?;
    Ok(Json(finance::update_transaction(&state.db, &current, fields).await?))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    finance::delete_transaction(&state.db, &id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub period: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CategoryAmount {
    pub category: TransactionCategory,
    pub amount: f64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct DayTrend {
    pub date: NaiveDate,
    pub income: f64,
    pub expense: f64,
}

#[derive(Debug, Serialize)]
pub struct TransactionSummary {
    pub total_income: f64,
    pub total_expense: f64,
    pub balance: f64,
    pub month_income: f64,
    pub month_expense: f64,
    pub categories_breakdown: Vec<CategoryAmount>,
    pub daily_trend: Vec<DayTrend>,
}

/// Date range selected by `period`: `month` (default), `year` or `custom`
fn summary_range(query: &SummaryQuery, today: NaiveDate) -> ApiResult<(Option<NaiveDate>, Option<NaiveDate>)> {
    match query.period.as_deref().unwrap_or("month") {
        "month" => {
            let (first, last) = time::month_bounds(today);
            Ok((Some(first), Some(last)))
        }
        "year" => Ok((
            NaiveDate::from_ymd_opt(today.year(), 1, 1),
            NaiveDate::from_ymd_opt(today.year(), 12, 31),
        )),
        "custom" => {
            if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
                if end < start {
                    return Err(ApiError::field("end_date", "End date must not be before start date"));
                }
            }
            Ok((query.start_date, query.end_date))
        }
        other => Err(ApiError::field("period", format!("'{}' is not a valid choice", other))),
    }
}

/// GET /api/life/transactions/summary
pub async fn transaction_summary(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<SummaryQuery>,
) -> ApiResult<Json<TransactionSummary>> {
    let today = time::today();
    let (start, end) = summary_range(&query, today)?;

    let totals = finance::totals_between(&state.db, &user.id, start, end).await?;
    let (month_start, month_end) = time::month_bounds(today);
    let month = finance::totals_between(&state.db, &user.id, Some(month_start), Some(month_end)).await?;

    let categories_breakdown = finance::expenses_by_category(&state.db, &user.id, start, end)
        .await?
        .into_iter()
        .map(|(category, amount)| CategoryAmount {
            category,
            amount,
            percentage: if totals.expense > 0.0 {
                round1(amount / totals.expense * 100.0)
            } else {
                0.0
            },
        })
        .collect();

    let trend_start = today - Duration::days(TREND_DAYS - 1);
    let days = finance::daily_totals(&state.db, &user.id, trend_start, today).await?;
    let daily_trend = (0..TREND_DAYS)
        .map(|offset| {
            let date = trend_start + Duration::days(offset);
            let day = days.get(&date).copied().unwrap_or_default();
            DayTrend {
                date,
                income: day.income,
                expense: day.expense,
            }
        })
        .collect();

    Ok(Json(TransactionSummary {
        total_income: totals.income,
        total_expense: totals.expense,
        balance: totals.income - totals.expense,
        month_income: month.income,
        month_expense: month.expense,
        categories_breakdown,
        daily_trend,
    }))
}

// Budgets

#[derive(Debug, Deserialize)]
pub struct BudgetQuery {
    pub category: Option<BudgetCategory>,
    pub period: Option<BudgetPeriod>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBudget {
    pub category: BudgetCategory,
    pub amount: f64,
    #[serde(default = "default_period")]
    pub period: BudgetPeriod,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub spent_amount: f64,
}

fn default_period() -> BudgetPeriod {
    BudgetPeriod::Monthly
}

#[derive(Debug, Deserialize)]
pub struct UpdateBudget {
    pub category: Option<BudgetCategory>,
    pub amount: Option<f64>,
    pub period: Option<BudgetPeriod>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub spent_amount: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
pub struct CategoryBudget {
    pub budget: f64,
    pub spent: f64,
    pub remaining: f64,
}

#[derive(Debug, Serialize)]
pub struct BudgetSummary {
    pub total_budget: f64,
    pub total_spent: f64,
    pub total_remaining: f64,
    pub category_summary: BTreeMap<String, CategoryBudget>,
}

fn check_budget(fields: BudgetFields) -> ApiResult<BudgetFields> {
    validate::positive("amount", fields.amount)?;
    validate::non_negative("spent_amount", fields.spent_amount)?;
    if fields.end_date < fields.start_date {
        return Err(ApiError::field("end_date", "End date must not be before start date"));
    }
    Ok(fields)
}

pub async fn list_budgets(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<BudgetQuery>,
) -> ApiResult<Json<Page<BudgetRow>>> {
    let filter = BudgetFilter {
        category: query.category,
        period: query.period,
    };
    Ok(Json(finance::list_budgets(&state.db, &user.id, filter, &params).await?))
}

pub async fn create_budget(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateBudget>,
) -> ApiResult<(StatusCode, Json<BudgetRow>)> {
    let fields = check_budget(BudgetFields {
        category: req.category,
        amount: req.amount,
        period: req.period,
        start_date: req.start_date,
        end_date: req.end_date,
        spent_amount: req.spent_amount,
    })?;
    Ok((StatusCode::CREATED, Json(finance::create_budget(&state.db, &user.id, fields).await?)))
}

pub async fn get_budget(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<BudgetRow>> {
    Ok(Json(finance::get_budget(&state.db, &id, &user.id).await?))
}

pub async fn update_budget(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateBudget>,
) -> ApiResult<Json<BudgetRow>> {
    let current = finance::get_budget(&state.db, &id, &user.id).await?;
    let fields = check_budget(BudgetFields {
        category: merge(current.category, req.category),
        amount: merge(current.amount, req.amount),
        period: merge(current.period, req.period),
        start_date: merge(current.start_date, req.start_date),
        end_date: merge(current.end_date, req.end_date),
        spent_amount: merge(current.spent_amount, req.spent_amount),
    })?;
    Ok(Json(finance::update_budget(&state.db, &id, &user.id, fields).await?))
}

pub async fn delete_budget(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "budgets", "creator_id", &id, &user.id, "Budget").await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/life/budgets/current_month
pub async fn current_month(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<BudgetRow>>> {
    let (first, last) = time::month_bounds(time::today());
    Ok(Json(finance::monthly_budgets_overlapping(&state.db, &user.id, first, last).await?))
}

/// GET /api/life/budgets/summary
pub async fn budget_summary(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<BudgetSummary>> {
    let budgets = finance::all_budgets(&state.db, &user.id).await?;
    Ok(Json(summarize_budgets(&budgets)))
}

fn summarize_budgets(budgets: &[BudgetRow]) -> BudgetSummary {
    let mut category_summary: BTreeMap<String, CategoryBudget> = BTreeMap::new();
    for budget in budgets {
        let entry = category_summary.entry(budget.category.to_string()).or_default();
        entry.budget += budget.amount;
        entry.spent += budget.spent_amount;
    }
    for entry in category_summary.values_mut() {
        entry.remaining = entry.budget - entry.spent;
    }

    let total_budget: f64 = budgets.iter().map(|b| b.amount).sum();
    let total_spent: f64 = budgets.iter().map(|b| b.spent_amount).sum();
    BudgetSummary {
        total_budget,
        total_spent,
        total_remaining: total_budget - total_spent,
        category_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(period: &str) -> SummaryQuery {
        SummaryQuery {
            period: Some(period.to_string()),
            start_date: None,
            end_date: None,
        }
    }

    #[test]
    fn test_summary_range_by_period() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 14).unwrap();
        let (start, end) = summary_range(&query("month"), today).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29));

        let (start, end) = summary_range(&query("year"), today).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31));

        assert_eq!(summary_range(&query("custom"), today).unwrap(), (None, None));
        assert!(summary_range(&query("weekly"), today).is_err());
    }

    #[test]
    fn test_budget_summary_groups_by_category() {
        let now = time::now();
        let budget = |category, amount, spent| BudgetRow {
            id: "b".to_string(),
            category,
            amount,
            period: BudgetPeriod::Monthly,
            start_date: now.date_naive(),
            end_date: now.date_naive(),
            spent_amount: spent,
            percentage_used: 0.0,
            creator_id: "u".to_string(),
            created_at: now,
            updated_at: now,
        };
        let summary = summarize_budgets(&[
            budget(BudgetCategory::Food, 500.0, 120.0),
            budget(BudgetCategory::Transport, 200.0, 250.0),
        ]);
        assert_eq!(summary.total_budget, 700.0);
        assert_eq!(summary.total_remaining, 330.0);
        assert_eq!(summary.category_summary["transport"].remaining, -50.0);
    }
}
