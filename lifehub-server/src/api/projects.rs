//! Project endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use lifehub_common::models::ProjectStatus;
use lifehub_common::patch::{deserialize_some, merge};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::db::projects::{self, ProjectFields, ProjectFilter, ProjectRow};
use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::pagination::{ListParams, Page};
use crate::response_cache::invalidate;
use crate::validate;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks/projects", get(list_projects).post(create_project))
        .route(
            "/api/tasks/projects/:id",
            get(get_project).put(update_project).patch(update_project).delete(delete_project),
        )
        .route("/api/tasks/projects/:id/add_member", post(add_member))
        .route("/api/tasks/projects/:id/remove_member", post(remove_member).delete(remove_member))
}

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    pub status: Option<ProjectStatus>,
    pub creator: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_status")]
    pub status: ProjectStatus,
    #[serde(default)]
    pub members: Vec<String>,
}

fn default_status() -> ProjectStatus {
    ProjectStatus::Planning
}

#[derive(Debug, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub end_date: Option<Option<NaiveDate>>,
    pub status: Option<ProjectStatus>,
    pub members: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub email: String,
}

fn check_fields(fields: ProjectFields) -> ApiResult<ProjectFields> {
    let name = validate::required_text("name", &fields.name, 200)?;
    if let (Some(start), Some(end)) = (fields.start_date, fields.end_date) {
        if end < start {
            return Err(ApiError::field("end_date", "End date must not be before start date"));
        }
    }
    Ok(ProjectFields { name, ..fields })
}

/// GET /api/tasks/projects
pub async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<ProjectQuery>,
) -> ApiResult<Json<Page<ProjectRow>>> {
    let filter = ProjectFilter {
        status: query.status,
        creator: query.creator,
    };
    Ok(Json(projects::list(&state.db, &user.id, filter, &params).await?))
}

/// POST /api/tasks/projects
pub async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateProject>,
) -> ApiResult<(StatusCode, Json<ProjectRow>)> {
    let fields = check_fields(ProjectFields {
        name: req.name,
        description: req.description,
        start_date: req.start_date,
        end_date: req.end_date,
        status: req.status,
    })?;

    let project = projects::create(&state.db, &user.id, fields, &req.members).await?;
    info!("Project {} created by {}", project.id, user.username);
    invalidate(&state, &user.id, "tasks.").await;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/tasks/projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<ProjectRow>> {
    Ok(Json(projects::get_visible(&state.db, &id, &user.id).await?))
}

/// PUT|PATCH /api/tasks/projects/:id
pub async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateProject>,
) -> ApiResult<Json<ProjectRow>> {
    let current = projects::get_visible(&state.db, &id, &user.id).await?;
    if !current.can_edit(&user.id) {
        return Err(ApiError::Authorization("You do not have permission to edit this project".to_string()));
    }
    if req.members.is_some() && current.creator_id != user.id {
        return Err(ApiError::Authorization("Only the project creator can manage members".to_string()));
    }

    let fields = check_fields(ProjectFields {
        name: merge(current.name, req.name),
        description: merge(current.description, req.description),
        start_date: merge(current.start_date, req.start_date),
        end_date: merge(current.end_date, req.end_date),
        status: merge(current.status, req.status),
    })?;

    projects::update(&state.db, &id, fields, req.members.as_deref()).await?;
    invalidate(&state, &user.id, "tasks.").await;
    Ok(Json(projects::get_visible(&state.db, &id, &user.id).await?))
}

/// DELETE /api/tasks/projects/:id
pub async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    let project = projects::get_visible(&state.db, &id, &user.id).await?;
    if project.creator_id != user.id {
        return Err(ApiError::Authorization("Only the project creator can delete it".to_string()));
    }
    projects::delete(&state.db, &id).await?;
    info!("Project {} deleted by {}", id, user.username);
    invalidate(&state, &user.id, "tasks.").await;
    Ok(StatusCode::NO_CONTENT)
}

async fn member_target(state: &AppState, user: &AuthUser, id: &str, email: &str) -> ApiResult<String> {
    let project = projects::get_visible(&state.db, id, &user.id).await?;
    if project.creator_id != user.id {
        return Err(ApiError::Authorization("Only the project creator can manage members".to_string()));
    }
    let email = validate::email("email", email)?;
    users::find_id_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::field("email", "No user with this email"))
}

/// POST /api/tasks/projects/:id/add_member
pub async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<MemberRequest>,
) -> ApiResult<Json<Value>> {
    let member_id = member_target(&state, &user, &id, &req.email).await?;
    projects::add_member(&state.db, &id, &member_id).await?;
    Ok(Json(json!({ "message": "Member added" })))
}

/// POST|DELETE /api/tasks/projects/:id/remove_member
pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<MemberRequest>,
) -> ApiResult<Json<Value>> {
    let member_id = member_target(&state, &user, &id, &req.email).await?;
    if !projects::remove_member(&state.db, &id, &member_id).await? {
        return Err(ApiError::field("email", "User is not a member of this project"));
    }
    Ok(Json(json!({ "message": "Member removed" })))
}
