//! Task endpoints: CRUD, kanban board, dependencies, comments, statistics

use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lifehub_common::models::{TaskPriority, TaskStatus};
use lifehub_common::patch::{deserialize_some, merge};
use lifehub_common::time;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::db::tasks::{self, CommentRow, DependencyRow, TaskFields, TaskFilter, TaskRow};
use crate::db::{projects, users};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::response_cache::{cached_json, invalidate, CacheRequest};
use crate::validate;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/tasks/board", get(board))
        .route("/api/tasks/tasks/today", get(today))
        .route("/api/tasks/tasks/todo", get(todo))
        .route("/api/tasks/tasks/completed", get(completed))
        .route(
            "/api/tasks/tasks/:id",
            get(get_task).put(update_task).patch(update_task).delete(delete_task),
        )
        .route("/api/tasks/tasks/:id/update_status", post(update_status))
        .route("/api/tasks/tasks/:id/add_dependency", post(add_dependency))
        .route("/api/tasks/tasks/:id/remove_dependency", post(remove_dependency).delete(remove_dependency))
        .route("/api/tasks/tasks/:id/add_comment", post(add_comment))
        .route("/api/tasks/statistics", get(statistics))
}

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
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

#[derive(Debug, Deserialize)]
pub struct CreateTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub parent: Option<String>,
    pub project: Option<String>,
    pub assignee: Option<String>,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

fn default_status() -> TaskStatus {
    TaskStatus::Todo
}

#[derive(Debug, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub parent: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub project: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub assignee: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct DependencyRequest {
    pub depends_on_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: TaskRow,
    pub children: Vec<TaskRow>,
    pub comments: Vec<CommentRow>,
    pub dependencies: Vec<DependencyRow>,
}

/// Check title and that linked parent, project and assignee are usable
async fn check_fields(
    state: &AppState,
    user: &AuthUser,
    task_id: Option<&str>,
    fields: TaskFields,
) -> ApiResult<TaskFields> {
    let title = validate::required_text("title", &fields.title, 200)?;

    if let Some(parent_id) = &fields.parent_id {
        if tasks::get_visible(&state.db, parent_id, &user.id).await.is_err() {
            return Err(ApiError::field("parent", format!("Invalid pk \"{}\" - object does not exist.", parent_id)));
        }
        if let Some(task_id) = task_id {
            if tasks::parent_creates_loop(&state.db, task_id, parent_id).await? {
                return Err(ApiError::field("parent", "A task cannot be its own ancestor"));
            }
        }
    }
    if let Some(project_id) = &fields.project_id {
        if projects::get_visible(&state.db, project_id, &user.id).await.is_err() {
            return Err(ApiError::field("project", format!("Invalid pk \"{}\" - object does not exist.", project_id)));
        }
    }
    if let Some(assignee_id) = &fields.assignee_id {
        if users::find_by_id(&state.db, assignee_id).await.is_err() {
            return Err(ApiError::field("assignee", format!("Invalid pk \"{}\" - object does not exist.", assignee_id)));
        }
    }

    Ok(TaskFields { title, ..fields })
}

/// Load a visible task and require write access
async fn writable(state: &AppState, user: &AuthUser, id: &str) -> ApiResult<TaskRow> {
    let task = tasks::get_visible(&state.db, id, &user.id).await?;
    if !tasks::can_write(&state.db, &task, &user.id).await? {
        return Err(ApiError::Authorization("You do not have permission to modify this task".to_string()));
    }
    Ok(task)
}

/// GET /api/tasks/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(q): ApiQuery<TaskQuery>,
) -> ApiResult<Json<Page<TaskRow>>> {
    let filter = TaskFilter {
        status: q.status,
        priority: q.priority,
        project: q.project,
        creator: q.creator,
        assignee: q.assignee,
        parent: q.parent,
        created_after: q.created_after,
        created_before: q.created_before,
        due_after: q.due_after,
        due_before: q.due_before,
    };
    Ok(Json(tasks::list(&state.db, &user.id, filter, &params).await?))
}

/// POST /api/tasks/tasks
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateTask>,
) -> ApiResult<(StatusCode, Json<TaskRow>)> {
    let fields = check_fields(
        &state,
        &user,
        None,
        TaskFields {
            title: req.title,
            description: req.description,
            priority: req.priority,
            status: req.status,
            due_date: req.due_date,
            parent_id: req.parent,
            project_id: req.project,
            assignee_id: req.assignee,
        },
    )
    .await?;

    let task = tasks::create(&state.db, &user.id, fields).await?;
    info!("Task {} created by {}", task.id, user.username);
    invalidate(&state, &user.id, "tasks.").await;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<TaskDetail>> {
    let task = tasks::get_visible(&state.db, &id, &user.id).await?;
    Ok(Json(TaskDetail {
        children: tasks::children(&state.db, &task.id).await?,
        comments: tasks::comments(&state.db, &task.id).await?,
        dependencies: tasks::dependencies(&state.db, &task.id).await?,
        task,
    }))
}

/// PUT|PATCH /api/tasks/tasks/:id
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateTask>,
) -> ApiResult<Json<TaskRow>> {
    let current = writable(&state, &user, &id).await?;

    let fields = check_fields(
        &state,
        &user,
        Some(&id),
        TaskFields {
            title: merge(current.title.clone(), req.title),
            description: merge(current.description.clone(), req.description),
            priority: merge(current.priority, req.priority),
            status: merge(current.status, req.status),
            due_date: merge(current.due_date, req.due_date),
            parent_id: merge(current.parent_id.clone(), req.parent),
            project_id: merge(current.project_id.clone(), req.project),
            assignee_id: merge(current.assignee_id.clone(), req.assignee),
        },
    )
    .await?;

    tasks::update(&state.db, &current, fields).await?;
    invalidate(&state, &user.id, "tasks.").await;
    Ok(Json(tasks::get_visible(&state.db, &id, &user.id).await?))
}

/// DELETE /api/tasks/tasks/:id
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    writable(&state, &user, &id).await?;
    tasks::delete(&state.db, &id).await?;
    info!("Task {} deleted by {}", id, user.username);
    invalidate(&state, &user.id, "tasks.").await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/tasks/tasks/board
pub async fn board(State(state): State<AppState>, user: AuthUser, request: CacheRequest) -> ApiResult<Response> {
    let db = state.db.clone();
    let user_id = user.id.clone();
    cached_json(&state, &user, &request, "tasks.board", "kanban_board", || async move {
        let rows = tasks::list_all(&db, &user_id, |_| {}).await?;
        let mut columns: Map<String, Value> = TaskStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), Value::Array(Vec::new())))
            .collect();
        for row in rows {
            let key = row.status.as_str();
            if let Some(Value::Array(column)) = columns.get_mut(key) {
                column.push(serde_json::to_value(&row).map_err(|e| ApiError::Internal(e.into()))?);
            }
        }
        Ok(Value::Object(columns))
    })
    .await
}

/// GET /api/tasks/tasks/today
pub async fn today(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<TaskRow>>> {
    let (start, end) = time::day_bounds(time::today());
    let rows = tasks::list_all(&state.db, &user.id, |c| {
        c.cmp("t.due_date", ">=", Some(start)).cmp("t.due_date", "<", Some(end));
    })
    .await?;
    Ok(Json(rows))
}

/// GET /api/tasks/tasks/todo
pub async fn todo(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<TaskRow>>> {
    let rows = tasks::list_all(&state.db, &user.id, |c| {
        c.eq("t.status", Some(TaskStatus::Todo.as_str()));
    })
    .await?;
    Ok(Json(rows))
}

/// GET /api/tasks/tasks/completed
pub async fn completed(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<TaskRow>>> {
    let rows = tasks::list_all(&state.db, &user.id, |c| {
        c.eq("t.status", Some(TaskStatus::Completed.as_str()));
    })
    .await?;
    Ok(Json(rows))
}

/// POST /api/tasks/tasks/:id/update_status
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> ApiResult<Json<Value>> {
    let status: TaskStatus = req
        .status
        .parse()
        .map_err(|_| ApiError::field("status", "Invalid status value"))?;
    let task = writable(&state, &user, &id).await?;

    tasks::set_status(&state.db, &task, status).await?;
    invalidate(&state, &user.id, "tasks.").await;
    Ok(Json(json!({ "message": "Status updated", "status": status })))
}

/// POST /api/tasks/tasks/:id/add_dependency
pub async fn add_dependency(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<DependencyRequest>,
) -> ApiResult<(StatusCode, Json<DependencyRow>)> {
    let task = writable(&state, &user, &id).await?;
    let depends_on = tasks::get_visible(&state.db, &req.depends_on_id, &user.id)
        .await
        .map_err(|_| ApiError::NotFound("Dependency task not found".to_string()))?;

    if depends_on.id == task.id {
        return Err(ApiError::business("CIRCULAR_DEPENDENCY", "A task cannot depend on itself"));
    }
    if depends_on.status == TaskStatus::Completed {
        return Err(ApiError::business(
            "DEPENDENCY_COMPLETED",
            "Cannot depend on a task that is already completed",
        ));
    }
    let graph = tasks::dependency_graph(&state.db).await?;
    if graph.would_create_cycle(&task.id, &depends_on.id) {
        return Err(ApiError::business("CIRCULAR_DEPENDENCY", "This dependency would create a cycle"));
    }

    let dependency = tasks::add_dependency(&state.db, &task.id, &depends_on.id).await?;
    invalidate(&state, &user.id, "tasks.").await;
    Ok((StatusCode::CREATED, Json(dependency)))
}

/// POST|DELETE /api/tasks/tasks/:id/remove_dependency
pub async fn remove_dependency(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<DependencyRequest>,
) -> ApiResult<Json<Value>> {
    let task = writable(&state, &user, &id).await?;
    if !tasks::remove_dependency(&state.db, &task.id, &req.depends_on_id).await? {
        return Err(ApiError::NotFound("Dependency not found".to_string()));
    }
    Ok(Json(json!({ "message": "Dependency removed" })))
}

/// POST /api/tasks/tasks/:id/add_comment
pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentRow>)> {
    let task = tasks::get_visible(&state.db, &id, &user.id).await?;
    let content = validate::required_text("content", &req.content, 10_000)?;
    let comment = tasks::add_comment(&state.db, &task.id, &user.id, &content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /api/tasks/statistics
pub async fn statistics(State(state): State<AppState>, user: AuthUser, request: CacheRequest) -> ApiResult<Response> {
    let db = state.db.clone();
    let user_id = user.id.clone();
    cached_json(&state, &user, &request, "tasks.statistics", "task_list", || async move {
        let stats = tasks::statistics(&db, &user_id).await?;
        serde_json::to_value(stats).map_err(|e| ApiError::Internal(e.into()))
    })
    .await
}
