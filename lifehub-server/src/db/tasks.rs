//! Tasks, dependency edges and comments

use chrono::{DateTime, Utc};
use lifehub_common::formulas::{is_overdue, task_completion_rate};
use lifehub_common::models::{TaskPriority, TaskStatus};
use lifehub_common::task_graph::DependencyGraph;
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page, SqlValue};

pub const SELECT: &str = "t.id, t.title, t.description, t.priority, t.status, t.due_date,
    t.parent_id, t.project_id, t.creator_id, t.assignee_id, t.created_at, t.updated_at, t.completed_at,
    cu.username AS creator_name, au.username AS assignee_name, pr.name AS project_name,
    (SELECT COUNT(*) FROM tasks c WHERE c.parent_id = t.id) AS children_count,
    (SELECT COUNT(*) FROM tasks c WHERE c.parent_id = t.id AND c.status = 'completed') AS children_completed";

pub const FROM: &str = "tasks t
    JOIN users cu ON cu.id = t.creator_id
    LEFT JOIN users au ON au.id = t.assignee_id
    LEFT JOIN projects pr ON pr.id = t.project_id";

/// Creator, assignee, project creator or project member
pub const VISIBLE: &str = "t.creator_id = ? OR t.assignee_id = ?
    OR EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = t.project_id AND m.user_id = ?)
    OR EXISTS (SELECT 1 FROM projects vp WHERE vp.id = t.project_id AND vp.creator_id = ?)";

const PRIORITY_RANK: &str = "CASE t.priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END";

pub const ORDERING: &[(&str, &str)] = &[
    ("created_at", "t.created_at"),
    ("updated_at", "t.updated_at"),
    ("due_date", "t.due_date"),
    ("priority", PRIORITY_RANK),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(rename = "parent")]
    pub parent_id: Option<String>,
    #[serde(rename = "project")]
    pub project_id: Option<String>,
    #[serde(rename = "creator")]
    pub creator_id: String,
    #[serde(rename = "assignee")]
    pub assignee_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub creator_name: String,
    pub assignee_name: Option<String>,
    pub project_name: Option<String>,
    pub children_count: i64,
    #[serde(skip)]
    pub children_completed: i64,
    #[sqlx(skip)]
    pub is_overdue: bool,
    #[sqlx(skip)]
    pub completion_rate: f64,
}

impl TaskRow {
    pub fn finish(mut self) -> Self {
        self.is_overdue = is_overdue(self.due_date, self.status, time::now());
        self.completion_rate = task_completion_rate(self.children_count, self.children_completed, self.status);
        self
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DependencyRow {
    pub id: String,
    #[serde(rename = "task")]
    pub task_id: String,
    #[serde(rename = "depends_on")]
    pub depends_on_id: String,
    pub task_title: String,
    pub depends_on_title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommentRow {
    pub id: String,
    #[serde(rename = "task")]
    pub task_id: String,
    #[serde(rename = "author")]
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub project: Option<String>,
    pub creator: Option<String>,
    pub assignee: Option<String>,
    pub parent: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    pub due_before: Option<DateTime<Utc>>,
}

/// Writable task columns
#[derive(Debug, Clone)]
pub struct TaskFields {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub parent_id: Option<String>,
    pub project_id: Option<String>,
    pub assignee_id: Option<String>,
}

pub fn visible(user_id: &str) -> Conditions {
    let mut c = Conditions::new();
    c.push(VISIBLE, std::iter::repeat(SqlValue::from(user_id)).take(4));
    c
}

pub fn apply_filter(c: &mut Conditions, filter: TaskFilter) {
    c.eq("t.status", filter.status.map(|s| s.as_str()))
        .eq("t.priority", filter.priority.map(|p| p.as_str()))
        .eq("t.project_id", filter.project)
        .eq("t.creator_id", filter.creator)
        .eq("t.assignee_id", filter.assignee)
        .eq("t.parent_id", filter.parent)
        .cmp("t.created_at", ">=", filter.created_after)
        .cmp("t.created_at", "<=", filter.created_before)
        .cmp("t.due_date", ">=", filter.due_after)
        .cmp("t.due_date", "<=", filter.due_before);
}

pub async fn list(db: &SqlitePool, user_id: &str, filter: TaskFilter, params: &ListParams) -> ApiResult<Page<TaskRow>> {
    let mut c = visible(user_id);
    apply_filter(&mut c, filter);
    c.search(&["t.title", "t.description"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), ORDERING, "t.created_at DESC")?;

    let page: Page<TaskRow> = pagination::paginate(db, SELECT, FROM, &c, &order, params).await?;
    Ok(page.map(TaskRow::finish))
}

/// Every visible task matching extra conditions, newest first
pub async fn list_all(db: &SqlitePool, user_id: &str, extra: impl FnOnce(&mut Conditions)) -> ApiResult<Vec<TaskRow>> {
    let mut c = visible(user_id);
    extra(&mut c);
    let rows: Vec<TaskRow> = pagination::fetch_all(db, SELECT, FROM, &c, "t.created_at DESC").await?;
    Ok(rows.into_iter().map(TaskRow::finish).collect())
}

pub async fn get_visible(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<TaskRow> {
    list_all(db, user_id, |c| {
        c.eq("t.id", Some(id));
    })
    .await?
    .into_iter()
    .next()
    .ok_or_else(|| ApiError::not_found("Task"))
}

/// Creator, project creator or project member may modify a task
pub async fn can_write(db: &SqlitePool, task: &TaskRow, user_id: &str) -> ApiResult<bool> {
    if task.creator_id == user_id {
        return Ok(true);
    }
    let Some(project_id) = &task.project_id else {
        return Ok(false);
    };
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM projects p WHERE p.id = ? AND (p.creator_id = ?
            OR EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = p.id AND m.user_id = ?))",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(found.is_some())
}

/// Whether making `parent_id` the parent of `task_id` would loop the hierarchy
pub async fn parent_creates_loop(db: &SqlitePool, task_id: &str, parent_id: &str) -> ApiResult<bool> {
    let mut current = Some(parent_id.to_string());
    let mut steps = 0;
    while let Some(id) = current {
        if id == task_id {
            return Ok(true);
        }
        steps += 1;
        if steps > 10_000 {
            return Ok(true);
        }
        current = sqlx::query_scalar::<_, Option<String>>("SELECT parent_id FROM tasks WHERE id = ?")
            .bind(&id)
            .fetch_optional(db)
            .await?
            .flatten();
    }
    Ok(false)
}

pub async fn create(db: &SqlitePool, creator_id: &str, fields: TaskFields) -> ApiResult<TaskRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    let completed_at = (fields.status == TaskStatus::Completed).then_some(now);

    sqlx::query(
        "INSERT INTO tasks (id, title, description, priority, status, due_date, parent_id, project_id,
                            creator_id, assignee_id, created_at, updated_at, completed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.priority)
    .bind(fields.status)
    .bind(fields.due_date)
    .bind(&fields.parent_id)
    .bind(&fields.project_id)
    .bind(creator_id)
    .bind(&fields.assignee_id)
    .bind(now)
    .bind(now)
    .bind(completed_at)
    .execute(db)
    .await?;

    get_visible(db, &id, creator_id).await
}

/// `completed_at` is stamped on the first transition to completed and
/// cleared when the task is reopened.
pub fn completed_at_for(current: &TaskRow, new_status: TaskStatus) -> Option<DateTime<Utc>> {
    match new_status {
        TaskStatus::Completed => Some(current.completed_at.unwrap_or_else(time::now)),
        _ => None,
    }
}

pub async fn update(db: &SqlitePool, current: &TaskRow, fields: TaskFields) -> ApiResult<()> {
    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, priority = ?, status = ?, due_date = ?,
                parent_id = ?, project_id = ?, assignee_id = ?, updated_at = ?, completed_at = ?
         WHERE id = ?",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.priority)
    .bind(fields.status)
    .bind(fields.due_date)
    .bind(&fields.parent_id)
    .bind(&fields.project_id)
    .bind(&fields.assignee_id)
    .bind(time::now())
    .bind(completed_at_for(current, fields.status))
    .bind(&current.id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn set_status(db: &SqlitePool, current: &TaskRow, status: TaskStatus) -> ApiResult<()> {
    sqlx::query("UPDATE tasks SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(completed_at_for(current, status))
        .bind(time::now())
        .bind(&current.id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn delete(db: &SqlitePool, id: &str) -> ApiResult<()> {
    sqlx::query("DELETE FROM tasks WHERE id = ?").bind(id).execute(db).await?;
    Ok(())
}

pub async fn children(db: &SqlitePool, task_id: &str) -> ApiResult<Vec<TaskRow>> {
    let mut c = Conditions::new();
    c.eq("t.parent_id", Some(task_id));
    let rows: Vec<TaskRow> = pagination::fetch_all(db, SELECT, FROM, &c, "t.created_at DESC").await?;
    Ok(rows.into_iter().map(TaskRow::finish).collect())
}

// ========================================
// Dependencies
// ========================================

const DEPENDENCY_SELECT: &str = "SELECT d.id, d.task_id, d.depends_on_id, t1.title AS task_title,
        t2.title AS depends_on_title, d.created_at
    FROM task_dependencies d
    JOIN tasks t1 ON t1.id = d.task_id
    JOIN tasks t2 ON t2.id = d.depends_on_id";

pub async fn dependencies(db: &SqlitePool, task_id: &str) -> ApiResult<Vec<DependencyRow>> {
    Ok(sqlx::query_as(&format!("{} WHERE d.task_id = ? ORDER BY d.created_at", DEPENDENCY_SELECT))
        .bind(task_id)
        .fetch_all(db)
        .await?)
}

/// Load the whole dependency graph
pub async fn dependency_graph(db: &SqlitePool) -> ApiResult<DependencyGraph> {
    let edges: Vec<(String, String)> = sqlx::query_as("SELECT task_id, depends_on_id FROM task_dependencies")
        .fetch_all(db)
        .await?;
    Ok(DependencyGraph::from_edges(edges))
}

pub async fn add_dependency(db: &SqlitePool, task_id: &str, depends_on_id: &str) -> ApiResult<DependencyRow> {
    let id = uuid_utils::generate();
    sqlx::query("INSERT INTO task_dependencies (id, task_id, depends_on_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(task_id)
        .bind(depends_on_id)
        .bind(time::now())
        .execute(db)
        .await?;

    Ok(sqlx::query_as(&format!("{} WHERE d.id = ?", DEPENDENCY_SELECT))
        .bind(&id)
        .fetch_one(db)
        .await?)
}

/// Returns false when no such edge existed
pub async fn remove_dependency(db: &SqlitePool, task_id: &str, depends_on_id: &str) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM task_dependencies WHERE task_id = ? AND depends_on_id = ?")
        .bind(task_id)
        .bind(depends_on_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ========================================
// Comments
// ========================================

const COMMENT_SELECT: &str = "SELECT c.id, c.task_id, c.author_id, u.username AS author_name, c.content,
        c.created_at, c.updated_at
    FROM task_comments c JOIN users u ON u.id = c.author_id";

pub async fn comments(db: &SqlitePool, task_id: &str) -> ApiResult<Vec<CommentRow>> {
    Ok(sqlx::query_as(&format!("{} WHERE c.task_id = ? ORDER BY c.created_at DESC", COMMENT_SELECT))
        .bind(task_id)
        .fetch_all(db)
        .await?)
}

pub async fn add_comment(db: &SqlitePool, task_id: &str, author_id: &str, content: &str) -> ApiResult<CommentRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    sqlx::query(
        "INSERT INTO task_comments (id, task_id, author_id, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(task_id)
    .bind(author_id)
    .bind(content)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(sqlx::query_as(&format!("{} WHERE c.id = ?", COMMENT_SELECT))
        .bind(&id)
        .fetch_one(db)
        .await?)
}

// ========================================
// Statistics
// ========================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TaskStatistics {
    pub total: i64,
    pub todo: i64,
    pub in_progress: i64,
    pub blocked: i64,
    pub completed: i64,
    pub overdue: i64,
}

/// Counts over tasks the user created or is assigned to
pub async fn statistics(db: &SqlitePool, user_id: &str) -> ApiResult<TaskStatistics> {
    Ok(sqlx::query_as(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(status = 'todo'), 0) AS todo,
                COALESCE(SUM(status = 'in_progress'), 0) AS in_progress,
                COALESCE(SUM(status = 'blocked'), 0) AS blocked,
                COALESCE(SUM(status = 'completed'), 0) AS completed,
                COALESCE(SUM(due_date IS NOT NULL AND due_date < ? AND status != 'completed'), 0) AS overdue
         FROM tasks WHERE creator_id = ? OR assignee_id = ?",
    )
    .bind(time::now())
    .bind(user_id)
    .bind(user_id)
    .fetch_one(db)
    .await?)
}
