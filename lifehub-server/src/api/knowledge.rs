//! Notes, tags and resources endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lifehub_common::models::{NoteFormat, ResourceType};
use lifehub_common::patch::merge;
use serde::{Deserialize, Serialize};

use crate::db::knowledge::{
    self, NoteFields, NoteFilter, NoteLinkRow, NoteRow, NoteVersionRow, ResourceFields, ResourceRow, TagRow,
};
use crate::db::{delete_owned, owned_tag_ids};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::media;
use crate::pagination::{ListParams, Page};
use crate::validate;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/knowledge/notes", get(list_notes).post(create_note))
        .route(
            "/api/knowledge/notes/:id",
            get(get_note).put(update_note).patch(update_note).delete(delete_note),
        )
        .route("/api/knowledge/notes/:id/add_link", post(add_link))
        .route("/api/knowledge/notes/:id/links", get(note_links))
        .route("/api/knowledge/notes/:id/versions", get(note_versions))
        .route("/api/knowledge/tags", get(list_tags).post(create_tag))
        .route(
            "/api/knowledge/tags/:id",
            get(get_tag).put(update_tag).patch(update_tag).delete(delete_tag),
        )
        .route("/api/knowledge/resources", get(list_resources).post(create_resource))
        .route(
            "/api/knowledge/resources/:id",
            get(get_resource).put(update_resource).patch(update_resource).delete(delete_resource),
        )
        .route("/api/knowledge/ocr", post(super::ocr::create_image))
}

// ========================================
// Tags
// ========================================

#[derive(Debug, Deserialize)]
pub struct CreateTag {
    pub name: String,
    #[serde(default = "default_tag_color")]
    pub color: String,
}

fn default_tag_color() -> String {
    "#666666".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateTag {
    pub name: Option<String>,
    pub color: Option<String>,
}

pub async fn list_tags(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<Page<TagRow>>> {
    Ok(Json(knowledge::list_tags(&state.db, &user.id, &params).await?))
}

pub async fn create_tag(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateTag>,
) -> ApiResult<(StatusCode, Json<TagRow>)> {
    let name = validate::required_text("name", &req.name, 50)?;
    let color = validate::hex_color("color", &req.color)?;
    Ok((StatusCode::CREATED, Json(knowledge::create_tag(&state.db, &user.id, &name, &color).await?)))
}

pub async fn get_tag(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<TagRow>> {
    Ok(Json(knowledge::get_tag(&state.db, &id, &user.id).await?))
}

pub async fn update_tag(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateTag>,
) -> ApiResult<Json<TagRow>> {
    let current = knowledge::get_tag(&state.db, &id, &user.id).await?;
    let name = validate::required_text("name", &merge(current.name, req.name), 50)?;
    let color = validate::hex_color("color", &merge(current.color, req.color))?;
    Ok(Json(knowledge::update_tag(&state.db, &id, &user.id, &name, &color).await?))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "tags", "creator_id", &id, &user.id, "Tag").await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Notes
// ========================================

#[derive(Debug, Deserialize)]
pub struct NoteQuery {
    pub format_type: Option<NoteFormat>,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_format")]
    pub format_type: NoteFormat,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

fn default_format() -> NoteFormat {
    NoteFormat::RichText
}

#[derive(Debug, Deserialize)]
pub struct UpdateNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub format_type: Option<NoteFormat>,
    pub tag_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub to_note_id: String,
}

#[derive(Debug, Serialize)]
pub struct NoteLinks {
    pub outgoing: Vec<NoteLinkRow>,
    pub incoming: Vec<NoteLinkRow>,
}

fn check_note(fields: NoteFields) -> ApiResult<NoteFields> {
    Ok(NoteFields {
        title: validate::required_text("title", &fields.title, 200)?,
        ..fields
    })
}

pub async fn list_notes(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<NoteQuery>,
) -> ApiResult<Json<Page<NoteRow>>> {
    let filter = NoteFilter {
        format_type: query.format_type,
        tag: query.tag,
    };
    Ok(Json(knowledge::list_notes(&state.db, &user.id, filter, &params).await?))
}

pub async fn create_note(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateNote>,
) -> ApiResult<(StatusCode, Json<NoteRow>)> {
    let fields = check_note(NoteFields {
        title: req.title,
        content: req.content,
        format_type: req.format_type,
    })?;
    let tag_ids = owned_tag_ids(&state.db, &user.id, &req.tag_ids).await?;
    Ok((StatusCode::CREATED, Json(knowledge::create_note(&state.db, &user.id, fields, &tag_ids).await?)))
}

pub async fn get_note(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<NoteRow>> {
    Ok(Json(knowledge::get_note(&state.db, &id, &user.id).await?))
}

pub async fn update_note(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateNote>,
) -> ApiResult<Json<NoteRow>> {
    let current = knowledge::get_note(&state.db, &id, &user.id).await?;
    let fields = check_note(NoteFields {
        title: merge(current.title.clone(), req.title),
        content: merge(current.content.clone(), req.content),
        format_type: merge(current.format_type, req.format_type),
    })?;
    let tag_ids = match &req.tag_ids {
        Some(ids) => Some(owned_tag_ids(&state.db, &user.id, ids).await?),
        None => None,
    };
    Ok(Json(
        knowledge::update_note(&state.db, &current, &user.id, fields, tag_ids.as_deref()).await?,
    ))
}

pub async fn delete_note(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete_owned(&state.db, "notes", "creator_id", &id, &user.id, "Note").await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/knowledge/notes/:id/add_link
pub async fn add_link(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<LinkRequest>,
) -> ApiResult<(StatusCode, Json<NoteLinkRow>)> {
    let note = knowledge::get_note(&state.db, &id, &user.id).await?;
    let target = knowledge::get_note(&state.db, &req.to_note_id, &user.id)
        .await
        .map_err(|_| ApiError::NotFound("Target note not found".to_string()))?;
    if note.id == target.id {
        return Err(ApiError::field("to_note_id", "A note cannot link to itself"));
    }
    Ok((StatusCode::CREATED, Json(knowledge::add_link(&state.db, &note.id, &target.id).await?)))
}

/// GET /api/knowledge/notes/:id/links
pub async fn note_links(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<NoteLinks>> {
    let note = knowledge::get_note(&state.db, &id, &user.id).await?;
    let (outgoing, incoming) = knowledge::links(&state.db, &note.id).await?;
    Ok(Json(NoteLinks { outgoing, incoming }))
}

/// GET /api/knowledge/notes/:id/versions
pub async fn note_versions(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<Vec<NoteVersionRow>>> {
    let note = knowledge::get_note(&state.db, &id, &user.id).await?;
    Ok(Json(knowledge::versions(&state.db, &note.id).await?))
}

// ========================================
// Resources
// ========================================

#[derive(Debug, Deserialize)]
pub struct ResourceQuery {
    pub file_type: Option<ResourceType>,
}

/// A resource either points at an existing path or uploads its content
#[derive(Debug, Deserialize)]
pub struct CreateResource {
    pub name: String,
    pub file_type: ResourceType,
    #[serde(default)]
    pub file_path: String,
    /// Base64 file content
    pub content: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateResource {
    pub name: Option<String>,
    pub file_type: Option<ResourceType>,
    pub description: Option<String>,
    pub tag_ids: Option<Vec<String>>,
}

pub async fn list_resources(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<ResourceQuery>,
) -> ApiResult<Json<Page<ResourceRow>>> {
    Ok(Json(knowledge::list_resources(&state.db, &user.id, query.file_type, &params).await?))
}

pub async fn create_resource(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateResource>,
) -> ApiResult<(StatusCode, Json<ResourceRow>)> {
    let name = validate::required_text("name", &req.name, 255)?;
    let tag_ids = owned_tag_ids(&state.db, &user.id, &req.tag_ids).await?;

    let (file_path, file_size) = match &req.content {
        Some(content) => {
            let bytes = media::decode_base64("content", content)?;
            let ext = media::extension(&name).unwrap_or_else(|| "bin".to_string());
            let path = media::store(&state.media_root, "resources", &ext, &bytes).await?;
            (path, bytes.len() as i64)
        }
        None => {
            validate::max_len("file_path", &req.file_path, 500)?;
            (req.file_path.clone(), 0)
        }
    };

    let fields = ResourceFields {
        name,
        file_path,
        file_type: req.file_type,
        file_size,
        description: req.description,
    };
    Ok((
        StatusCode::CREATED,
        Json(knowledge::create_resource(&state.db, &user.id, fields, &tag_ids).await?),
    ))
}

pub async fn get_resource(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<ResourceRow>> {
    Ok(Json(knowledge::get_resource(&state.db, &id, &user.id).await?))
}

pub async fn update_resource(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateResource>,
) -> ApiResult<Json<ResourceRow>> {
    let current = knowledge::get_resource(&state.db, &id, &user.id).await?;
    let fields = ResourceFields {
        name: validate::required_text("name", &merge(current.name, req.name), 255)?,
        file_path: current.file_path,
        file_type: merge(current.file_type, req.file_type),
        file_size: current.file_size,
        description: merge(current.description, req.description),
    };
    let tag_ids = match &req.tag_ids {
        Some(ids) => Some(owned_tag_ids(&state.db, &user.id, ids).await?),
        None => None,
    };
    Ok(Json(
        knowledge::update_resource(&state.db, &id, &user.id, fields, tag_ids.as_deref()).await?,
    ))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    let resource = knowledge::get_resource(&state.db, &id, &user.id).await?;
    delete_owned(&state.db, "resources", "creator_id", &id, &user.id, "Resource").await?;
    if resource.file_path.starts_with("resources/") {
        media::remove(&state.media_root, &resource.file_path).await;
    }
    Ok(StatusCode::NO_CONTENT)
}
