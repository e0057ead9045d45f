//! Projects and their members

use chrono::{DateTime, NaiveDate, Utc};
use lifehub_common::formulas::completion_rate;
use lifehub_common::models::ProjectStatus;
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::{types::Json, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page, SqlValue};

pub const SELECT: &str = "p.id, p.name, p.description, p.creator_id, u.username AS creator_name,
    (SELECT json_group_array(pm.user_id) FROM project_members pm WHERE pm.project_id = p.id) AS members,
    p.start_date, p.end_date, p.status, p.created_at, p.updated_at,
    (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id) AS task_count,
    (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id AND t.status = 'completed') AS completed_count";

pub const FROM: &str = "projects p JOIN users u ON u.id = p.creator_id";

/// Creator or member
pub const VISIBLE: &str =
    "p.creator_id = ? OR EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = p.id AND m.user_id = ?)";

pub const ORDERING: &[(&str, &str)] = &[
    ("created_at", "p.created_at"),
    ("updated_at", "p.updated_at"),
    ("name", "p.name"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub creator_name: String,
    pub members: Json<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub task_count: i64,
    #[serde(skip)]
    pub completed_count: i64,
    #[sqlx(skip)]
    pub completion_rate: f64,
}

impl ProjectRow {
    pub fn finish(mut self) -> Self {
        self.completion_rate = completion_rate(self.completed_count, self.task_count);
        self
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.0.iter().any(|m| m == user_id)
    }

    /// Creator and members may edit; only the creator manages membership
    pub fn can_edit(&self, user_id: &str) -> bool {
        self.creator_id == user_id || self.is_member(user_id)
    }
}

#[derive(Debug, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub creator: Option<String>,
}

#[derive(Debug)]
pub struct ProjectFields {
    pub name: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: ProjectStatus,
}

fn visible(user_id: &str) -> Conditions {
    let mut c = Conditions::new();
    c.push(VISIBLE, [SqlValue::from(user_id), SqlValue::from(user_id)]);
    c
}

pub async fn list(db: &SqlitePool, user_id: &str, filter: ProjectFilter, params: &ListParams) -> ApiResult<Page<ProjectRow>> {
    let mut c = visible(user_id);
    c.eq("p.status", filter.status.map(|s| s.as_str()))
        .eq("p.creator_id", filter.creator)
        .search(&["p.name", "p.description"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), ORDERING, "p.updated_at DESC")?;

    let page: Page<ProjectRow> = pagination::paginate(db, SELECT, FROM, &c, &order, params).await?;
    Ok(page.map(ProjectRow::finish))
}

/// Project visible to `user_id`, 404 otherwise
pub async fn get_visible(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<ProjectRow> {
    let mut c = visible(user_id);
    c.eq("p.id", Some(id));
    pagination::fetch_all::<ProjectRow>(db, SELECT, FROM, &c, "p.id")
        .await?
        .into_iter()
        .next()
        .map(ProjectRow::finish)
        .ok_or_else(|| ApiError::not_found("Project"))
}

pub async fn create(
    db: &SqlitePool,
    creator_id: &str,
    fields: ProjectFields,
    members: &[String],
) -> ApiResult<ProjectRow> {
    let id = uuid_utils::generate();
    let now = time::now();

    let mut tx = db.begin().await?;
    sqlx::query(
        "INSERT INTO projects (id, name, description, creator_id, start_date, end_date, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(creator_id)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(fields.status)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    for member in members {
        sqlx::query("INSERT OR IGNORE INTO project_members (project_id, user_id) VALUES (?, ?)")
            .bind(&id)
            .bind(member)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    get_visible(db, &id, creator_id).await
}

pub async fn update(
    db: &SqlitePool,
    id: &str,
    fields: ProjectFields,
    members: Option<&[String]>,
) -> ApiResult<()> {
    let mut tx = db.begin().await?;
    sqlx::query(
        "UPDATE projects SET name = ?, description = ?, start_date = ?, end_date = ?, status = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(fields.status)
    .bind(time::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if let Some(members) = members {
        sqlx::query("DELETE FROM project_members WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for member in members {
            sqlx::query("INSERT OR IGNORE INTO project_members (project_id, user_id) VALUES (?, ?)")
                .bind(id)
                .bind(member)
                .execute(&mut *tx)
                .await?;
        }
    }
    tx.commit().await?;
    Ok(())
}

pub async fn delete(db: &SqlitePool, id: &str) -> ApiResult<()> {
    sqlx::query("DELETE FROM projects WHERE id = ?").bind(id).execute(db).await?;
    Ok(())
}

pub async fn add_member(db: &SqlitePool, project_id: &str, user_id: &str) -> ApiResult<()> {
    sqlx::query("INSERT OR IGNORE INTO project_members (project_id, user_id) VALUES (?, ?)")
        .bind(project_id)
        .bind(user_id)
        .execute(db)
        .await?;
    touch(db, project_id).await
}

/// Returns false when the user was not a member
pub async fn remove_member(db: &SqlitePool, project_id: &str, user_id: &str) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
        .bind(project_id)
        .bind(user_id)
        .execute(db)
        .await?;
    touch(db, project_id).await?;
    Ok(result.rows_affected() > 0)
}

async fn touch(db: &SqlitePool, project_id: &str) -> ApiResult<()> {
    sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
        .bind(time::now())
        .bind(project_id)
        .execute(db)
        .await?;
    Ok(())
}
