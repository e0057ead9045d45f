//! Pagination and list-query helpers
//!
//! List endpoints share one shape: filters become a [`Conditions`] set,
//! `ordering` is checked against a per-endpoint whitelist, and
//! [`paginate`] runs the count and page queries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::{ApiError, ApiResult};

/// Page size when the client does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page size a client may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// The page is clamped to `[1, total_pages]`.
///
/// ```
/// use lifehub_server::pagination::calculate_pagination;
///
/// let p = calculate_pagination(45, 2, 20);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 20);
///
/// let p = calculate_pagination(45, 99, 20);
/// assert_eq!(p.page, 3);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64, page_size: i64) -> Pagination {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));

    Pagination {
        page,
        page_size,
        total_pages,
        offset: (page - 1) * page_size,
    }
}

/// Query parameters common to every list endpoint
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

impl ListParams {
    /// Trimmed search term, if any
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// One page of results
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// Owned bind value for dynamically built queries
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &SqlValue) {
    match value {
        SqlValue::Text(v) => qb.push_bind(v.clone()),
        SqlValue::Int(v) => qb.push_bind(*v),
        SqlValue::Real(v) => qb.push_bind(*v),
        SqlValue::Bool(v) => qb.push_bind(*v),
        SqlValue::Date(v) => qb.push_bind(*v),
        SqlValue::Timestamp(v) => qb.push_bind(*v),
    };
}

/// WHERE clause under construction
///
/// Each clause uses `?` placeholders, consumed in order from the values
/// pushed with it. Clauses are joined with AND.
#[derive(Debug, Default, Clone)]
pub struct Conditions {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw clause and its bind values
    pub fn push(&mut self, clause: &str, values: impl IntoIterator<Item = SqlValue>) -> &mut Self {
        self.clauses.push(format!("({})", clause));
        self.values.extend(values);
        self
    }

    /// `column = value` when the value is present
    pub fn eq<V: Into<SqlValue>>(&mut self, column: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.push(&format!("{} = ?", column), [v.into()]);
        }
        self
    }

    /// `column op value` when the value is present
    pub fn cmp<V: Into<SqlValue>>(&mut self, column: &str, op: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.push(&format!("{} {} ?", column, op), [v.into()]);
        }
        self
    }

    /// Case-insensitive substring match across several columns
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        if let Some(term) = term {
            let pattern = like_pattern(term);
            let clause = columns
                .iter()
                .map(|c| format!("LOWER({}) LIKE ? ESCAPE '\\'", c))
                .collect::<Vec<_>>()
                .join(" OR ");
            self.push(&clause, columns.iter().map(|_| SqlValue::Text(pattern.clone())));
        }
        self
    }

    /// Append ` WHERE ...` to the builder
    pub fn apply(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        if self.clauses.is_empty() {
            return;
        }
        let sql = self.clauses.join(" AND ");
        let mut values = self.values.iter();
        qb.push(" WHERE ");
        let mut parts = sql.split('?').peekable();
        while let Some(part) = parts.next() {
            qb.push(part);
            if parts.peek().is_some() {
                if let Some(value) = values.next() {
                    push_value(qb, value);
                }
            }
        }
    }
}

/// Lowercased `%term%` with LIKE wildcards in `term` escaped by `\`
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Resolve an `ordering` parameter against a whitelist
///
/// `allowed` maps API field names to SQL expressions. A leading `-` sorts
/// descending; several fields may be comma-separated.
pub fn order_by(ordering: Option<&str>, allowed: &[(&str, &str)], default: &str) -> ApiResult<String> {
    let Some(ordering) = ordering.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(default.to_string());
    };

    let mut terms = Vec::new();
    for field in ordering.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, direction) = match field.strip_prefix('-') {
            Some(name) => (name, "DESC"),
            None => (field, "ASC"),
        };
        let expr = allowed
            .iter()
            .find(|(api, _)| *api == name)
            .map(|(_, sql)| *sql)
            .ok_or_else(|| ApiError::field("ordering", format!("Cannot order by '{}'", name)))?;
        terms.push(format!("{} {}", expr, direction));
    }

    Ok(terms.join(", "))
}

/// Run the count and page queries for a list endpoint
///
/// `from` is everything between `FROM` and `WHERE`, joins included.
pub async fn paginate<T>(
    db: &SqlitePool,
    select: &str,
    from: &str,
    conditions: &Conditions,
    order: &str,
    params: &ListParams,
) -> ApiResult<Page<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut count_query = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", from));
    conditions.apply(&mut count_query);
    let total: i64 = count_query.build_query_scalar().fetch_one(db).await?;

    let p = calculate_pagination(
        total,
        params.page.unwrap_or(1),
        params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    );

    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM {}", select, from));
    conditions.apply(&mut query);
    query.push(format!(" ORDER BY {} LIMIT ", order));
    query.push_bind(p.page_size);
    query.push(" OFFSET ");
    query.push_bind(p.offset);
    let results = query.build_query_as::<T>().fetch_all(db).await?;

    Ok(Page {
        count: total,
        page: p.page,
        page_size: p.page_size,
        total_pages: p.total_pages,
        results,
    })
}

/// Fetch every row matching the conditions, unpaginated
pub async fn fetch_all<T>(
    db: &SqlitePool,
    select: &str,
    from: &str,
    conditions: &Conditions,
    order: &str,
) -> ApiResult<Vec<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM {}", select, from));
    conditions.apply(&mut query);
    query.push(format!(" ORDER BY {}", order));
    Ok(query.build_query_as::<T>().fetch_all(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Milk"), "%milk%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(250, 2, 100);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, 1, 20);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_page_size_clamped() {
        let p = calculate_pagination(1000, 1, 5000);
        assert_eq!(p.page_size, MAX_PAGE_SIZE);
        let p = calculate_pagination(10, 1, 0);
        assert_eq!(p.page_size, 1);
    }

    #[test]
    fn test_pagination_out_of_bounds() {
        let p = calculate_pagination(45, 0, 20);
        assert_eq!(p.page, 1);
        let p = calculate_pagination(45, 7, 20);
        assert_eq!(p.page, 3);
        assert_eq!(p.offset, 40);
    }

    #[test]
    fn test_order_by_whitelist() {
        let allowed = [("name", "p.name"), ("created_at", "p.created_at")];
        assert_eq!(order_by(None, &allowed, "p.created_at DESC").unwrap(), "p.created_at DESC");
        assert_eq!(order_by(Some("-name"), &allowed, "x").unwrap(), "p.name DESC");
        assert_eq!(
            order_by(Some("name,-created_at"), &allowed, "x").unwrap(),
            "p.name ASC, p.created_at DESC"
        );
        let err = order_by(Some("password_hash"), &allowed, "x").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_conditions_sql() {
        let mut c = Conditions::new();
        c.eq("t.status", Some("todo"))
            .eq::<&str>("t.priority", None)
            .search(&["t.title", "t.description"], Some("Milk"));
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM tasks t");
        c.apply(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM tasks t WHERE (t.status = ?) AND (LOWER(t.title) LIKE ? OR LOWER(t.description) LIKE ?)"
        );
    }

    #[tokio::test]
    async fn test_paginate_against_sqlite() {
        let db = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&db)
            .await
            .unwrap();
        for i in 0..25 {
            sqlx::query("INSERT INTO t (name) VALUES (?)")
                .bind(format!("row{:02}", i))
                .execute(&db)
                .await
                .unwrap();
        }

        #[derive(sqlx::FromRow)]
        struct Row {
            name: String,
        }

        let params = ListParams {
            page: Some(2),
            page_size: Some(10),
            ..Default::default()
        };
        let mut c = Conditions::new();
        c.cmp("name", ">=", Some("row05"));
        let page: Page<Row> = paginate(&db, "name", "t", &c, "name ASC", &params).await.unwrap();
        assert_eq!(page.count, 20);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.results.len(), 10);
        assert_eq!(page.results[0].name, "row15");
    }
}
