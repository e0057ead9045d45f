//! Transactions and budgets
//!
//! A budget's `spent_amount` may be set directly; once expense transactions
//! are linked to it, every transaction write recomputes it as their sum.
//! `percentage_used` is rewritten on every budget save.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use lifehub_common::formulas::budget_percentage;
use lifehub_common::models::{BudgetCategory, BudgetPeriod, TransactionCategory, TransactionType};
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page};

const TX_SELECT: &str = "t.id, t.amount, t.transaction_type, t.category, t.description, t.date, t.time,
    t.budget_id, t.creator_id, t.created_at";
const TX_FROM: &str = "transactions t";

const TX_ORDERING: &[(&str, &str)] = &[
    ("date", "t.date"),
    ("amount", "t.amount"),
    ("created_at", "t.created_at"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub category: TransactionCategory,
    pub description: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    #[serde(rename = "budget")]
    pub budget_id: Option<String>,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TransactionFilter {
    pub transaction_type: Option<TransactionType>,
    pub category: Option<TransactionCategory>,
}

#[derive(Debug)]
pub struct TransactionFields {
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub category: TransactionCategory,
    pub description: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub budget_id: Option<String>,
}

pub async fn list_transactions(
    db: &SqlitePool,
    user_id: &str,
    filter: TransactionFilter,
    params: &ListParams,
) -> ApiResult<Page<TransactionRow>> {
    let mut c = Conditions::new();
    c.eq("t.creator_id", Some(user_id))
        .eq("t.transaction_type", filter.transaction_type.map(|t| t.as_str()))
        .eq("t.category", filter.category.map(|t| t.as_str()))
        .search(&["t.description"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), TX_ORDERING, "t.date DESC, t.created_at DESC")?;
    pagination::paginate(db, TX_SELECT, TX_FROM, &c, &order, params).await
}

pub async fn get_transaction(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<TransactionRow> {
    sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE t.id = ? AND t.creator_id = ?",
        TX_SELECT, TX_FROM
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Transaction"))
}

pub async fn create_transaction(
    db: &SqlitePool,
    user_id: &str,
    fields: TransactionFields,
) -> ApiResult<TransactionRow> {
    let id = uuid_utils::generate();
    sqlx::query(
        "INSERT INTO transactions (id, amount, transaction_type, category, description, date, time, budget_id,
            creator_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(fields.amount)
    .bind(fields.transaction_type)
    .bind(fields.category)
    .bind(&fields.description)
    .bind(fields.date)
    .bind(fields.time)
    .bind(&fields.budget_id)
    .bind(user_id)
    .bind(time::now())
    .execute(db)
    .await?;

    if let Some(budget_id) = &fields.budget_id {
        recompute_spent(db, budget_id).await?;
    }
    get_transaction(db, &id, user_id).await
}

pub async fn update_transaction(
    db: &SqlitePool,
    current: &TransactionRow,
    fields: TransactionFields,
) -> ApiResult<TransactionRow> {
    sqlx::query(
        "UPDATE transactions SET amount = ?, transaction_type = ?, category = ?, description = ?, date = ?,
            time = ?, budget_id = ?
         WHERE id = ? AND creator_id = ?",
    )
    .bind(fields.amount)
    .bind(fields.transaction_type)
    .bind(fields.category)
    .bind(&fields.description)
    .bind(fields.date)
    .bind(fields.time)
    .bind(&fields.budget_id)
    .bind(&current.id)
    .bind(&current.creator_id)
    .execute(db)
    .await?;

    if let Some(previous) = &current.budget_id {
        recompute_spent(db, previous).await?;
    }
    if let Some(budget_id) = fields.budget_id.as_ref().filter(|b| current.budget_id.as_ref() != Some(*b)) {
        recompute_spent(db, budget_id).await?;
    }
    get_transaction(db, &current.id, &current.creator_id).await
}

pub async fn delete_transaction(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<()> {
    let current = get_transaction(db, id, user_id).await?;
    sqlx::query("DELETE FROM transactions WHERE id = ? AND creator_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;

    if let Some(budget_id) = &current.budget_id {
        recompute_spent(db, budget_id).await?;
    }
    Ok(())
}

/// Income and expense totals over an optional date range
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub income: f64,
    pub expense: f64,
}

pub async fn totals_between(
    db: &SqlitePool,
    user_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> ApiResult<Totals> {
    let rows: Vec<(TransactionType, f64)> = sqlx::query_as(
        "SELECT transaction_type, COALESCE(SUM(amount), 0) FROM transactions
         WHERE creator_id = ? AND (? IS NULL OR date >= ?) AND (? IS NULL OR date <= ?)
         GROUP BY transaction_type",
    )
    .bind(user_id)
    .bind(start)
    .bind(start)
    .bind(end)
    .bind(end)
    .fetch_all(db)
    .await?;

    let mut totals = Totals::default();
    for (kind, amount) in rows {
        match kind {
            TransactionType::Income => totals.income = amount,
            TransactionType::Expense => totals.expense = amount,
        }
    }
    Ok(totals)
}

/// Expense total per category over an optional date range
pub async fn expenses_by_category(
    db: &SqlitePool,
    user_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> ApiResult<Vec<(TransactionCategory, f64)>> {
    Ok(sqlx::query_as(
        "SELECT category, SUM(amount) AS total FROM transactions
         WHERE creator_id = ? AND transaction_type = 'expense'
           AND (? IS NULL OR date >= ?) AND (? IS NULL OR date <= ?)
         GROUP BY category ORDER BY total DESC",
    )
    .bind(user_id)
    .bind(start)
    .bind(start)
    .bind(end)
    .bind(end)
    .fetch_all(db)
    .await?)
}

/// Per-day totals from `start` to `end` inclusive; days without transactions are absent
pub async fn daily_totals(
    db: &SqlitePool,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> ApiResult<BTreeMap<NaiveDate, Totals>> {
    let rows: Vec<(NaiveDate, TransactionType, f64)> = sqlx::query_as(
        "SELECT date, transaction_type, SUM(amount) FROM transactions
         WHERE creator_id = ? AND date >= ? AND date <= ?
         GROUP BY date, transaction_type",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await?;

    let mut days: BTreeMap<NaiveDate, Totals> = BTreeMap::new();
    for (date, kind, amount) in rows {
        let entry = days.entry(date).or_default();
        match kind {
            TransactionType::Income => entry.income += amount,
            TransactionType::Expense => entry.expense += amount,
        }
    }
    Ok(days)
}

// Budgets

const BUDGET_SELECT: &str = "b.id, b.category, b.amount, b.period, b.start_date, b.end_date, b.spent_amount,
    b.percentage_used, b.creator_id, b.created_at, b.updated_at";
const BUDGET_FROM: &str = "budgets b";

const BUDGET_ORDERING: &[(&str, &str)] = &[
    ("start_date", "b.start_date"),
    ("amount", "b.amount"),
    ("percentage_used", "b.percentage_used"),
    ("created_at", "b.created_at"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BudgetRow {
    pub id: String,
    pub category: BudgetCategory,
    pub amount: f64,
    pub period: BudgetPeriod,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub spent_amount: f64,
    pub percentage_used: f64,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct BudgetFilter {
    pub category: Option<BudgetCategory>,
    pub period: Option<BudgetPeriod>,
}

#[derive(Debug)]
pub struct BudgetFields {
    pub category: BudgetCategory,
    pub amount: f64,
    pub period: BudgetPeriod,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub spent_amount: f64,
}

pub async fn list_budgets(
    db: &SqlitePool,
    user_id: &str,
    filter: BudgetFilter,
    params: &ListParams,
) -> ApiResult<Page<BudgetRow>> {
    let mut c = Conditions::new();
    c.eq("b.creator_id", Some(user_id))
        .eq("b.category", filter.category.map(|t| t.as_str()))
        .eq("b.period", filter.period.map(|t| t.as_str()));
    let order = pagination::order_by(params.ordering.as_deref(), BUDGET_ORDERING, "b.start_date DESC")?;
    pagination::paginate(db, BUDGET_SELECT, BUDGET_FROM, &c, &order, params).await
}

pub async fn all_budgets(db: &SqlitePool, user_id: &str) -> ApiResult<Vec<BudgetRow>> {
    let mut c = Conditions::new();
    c.eq("b.creator_id", Some(user_id));
    pagination::fetch_all(db, BUDGET_SELECT, BUDGET_FROM, &c, "b.category ASC").await
}

/// Monthly budgets overlapping `[from, to]`
pub async fn monthly_budgets_overlapping(
    db: &SqlitePool,
    user_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> ApiResult<Vec<BudgetRow>> {
    let mut c = Conditions::new();
    c.eq("b.creator_id", Some(user_id))
        .eq("b.period", Some(BudgetPeriod::Monthly.as_str()))
        .cmp("b.start_date", "<=", Some(to))
        .cmp("b.end_date", ">=", Some(from));
    pagination::fetch_all(db, BUDGET_SELECT, BUDGET_FROM, &c, "b.category ASC").await
}

pub async fn get_budget(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<BudgetRow> {
    sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE b.id = ? AND b.creator_id = ?",
        BUDGET_SELECT, BUDGET_FROM
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Budget"))
}

pub async fn create_budget(db: &SqlitePool, user_id: &str, fields: BudgetFields) -> ApiResult<BudgetRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    sqlx::query(
        "INSERT INTO budgets (id, category, amount, period, start_date, end_date, spent_amount, percentage_used,
            creator_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(fields.category)
    .bind(fields.amount)
    .bind(fields.period)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(fields.spent_amount)
    .bind(budget_percentage(fields.spent_amount, fields.amount))
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    get_budget(db, &id, user_id).await
}

pub async fn update_budget(db: &SqlitePool, id: &str, user_id: &str, fields: BudgetFields) -> ApiResult<BudgetRow> {
    sqlx::query(
        "UPDATE budgets SET category = ?, amount = ?, period = ?, start_date = ?, end_date = ?, spent_amount = ?,
            percentage_used = ?, updated_at = ?
         WHERE id = ? AND creator_id = ?",
    )
    .bind(fields.category)
    .bind(fields.amount)
    .bind(fields.period)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(fields.spent_amount)
    .bind(budget_percentage(fields.spent_amount, fields.amount))
    .bind(time::now())
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    get_budget(db, id, user_id).await
}

/// Rewrite a budget's spent amount from its linked expenses
async fn recompute_spent(db: &SqlitePool, budget_id: &str) -> ApiResult<()> {
    let row: Option<(f64, f64)> = sqlx::query_as(
        "SELECT b.amount, COALESCE((SELECT SUM(t.amount) FROM transactions t
            WHERE t.budget_id = b.id AND t.transaction_type = 'expense'), 0)
         FROM budgets b WHERE b.id = ?",
    )
    .bind(budget_id)
    .fetch_optional(db)
    .await?;

    let Some((amount, spent)) = row else {
        return Ok(());
    };
    sqlx::query("UPDATE budgets SET spent_amount = ?, percentage_used = ?, updated_at = ? WHERE id = ?")
        .bind(spent)
        .bind(budget_percentage(spent, amount))
        .bind(time::now())
        .bind(budget_id)
        .execute(db)
        .await?;
    Ok(())
}
