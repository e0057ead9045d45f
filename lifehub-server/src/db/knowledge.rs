//! Notes, links, versions, tags and resources

use chrono::{DateTime, Utc};
use lifehub_common::models::{NoteFormat, ResourceType};
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::{types::Json, Sqlite, SqlitePool, Transaction};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page, SqlValue};

// ========================================
// Tags
// ========================================

const TAG_SELECT: &str = "g.id, g.name, g.color, g.creator_id, g.created_at,
    (SELECT COUNT(*) FROM note_tags nt WHERE nt.tag_id = g.id) AS note_count";
const TAG_FROM: &str = "tags g";

const TAG_ORDERING: &[(&str, &str)] = &[("name", "g.name"), ("created_at", "g.created_at")];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TagRow {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub note_count: i64,
}

pub async fn list_tags(db: &SqlitePool, user_id: &str, params: &ListParams) -> ApiResult<Page<TagRow>> {
    let mut c = Conditions::new();
    c.eq("g.creator_id", Some(user_id)).search(&["g.name"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), TAG_ORDERING, "g.name ASC")?;
    pagination::paginate(db, TAG_SELECT, TAG_FROM, &c, &order, params).await
}

pub async fn get_tag(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<TagRow> {
    sqlx::query_as(&format!("SELECT {} FROM {} WHERE g.id = ? AND g.creator_id = ?", TAG_SELECT, TAG_FROM))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag"))
}

pub async fn create_tag(db: &SqlitePool, user_id: &str, name: &str, color: &str) -> ApiResult<TagRow> {
    let id = uuid_utils::generate();
    sqlx::query("INSERT INTO tags (id, name, color, creator_id, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(color)
        .bind(user_id)
        .bind(time::now())
        .execute(db)
        .await?;
    get_tag(db, &id, user_id).await
}

pub async fn update_tag(db: &SqlitePool, id: &str, user_id: &str, name: &str, color: &str) -> ApiResult<TagRow> {
    sqlx::query("UPDATE tags SET name = ?, color = ? WHERE id = ? AND creator_id = ?")
        .bind(name)
        .bind(color)
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    get_tag(db, id, user_id).await
}

/// Replace the rows of a tag link table for one owner
async fn set_tags(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    owner_column: &str,
    owner_id: &str,
    tag_ids: &[String],
) -> ApiResult<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", table, owner_column))
        .bind(owner_id)
        .execute(&mut **tx)
        .await?;
    for tag_id in tag_ids {
        sqlx::query(&format!("INSERT OR IGNORE INTO {} ({}, tag_id) VALUES (?, ?)", table, owner_column))
            .bind(owner_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

// ========================================
// Notes
// ========================================

const NOTE_SELECT: &str = "n.id, n.title, n.content, n.format_type, n.creator_id, n.created_at, n.updated_at,
    (SELECT json_group_array(nt.tag_id) FROM note_tags nt WHERE nt.note_id = n.id) AS tags,
    (SELECT COUNT(*) FROM note_versions v WHERE v.note_id = n.id) AS version_count";
const NOTE_FROM: &str = "notes n";

const NOTE_ORDERING: &[(&str, &str)] = &[
    ("updated_at", "n.updated_at"),
    ("created_at", "n.created_at"),
    ("title", "n.title"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NoteRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub format_type: NoteFormat,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Json<Vec<String>>,
    pub version_count: i64,
}

#[derive(Debug, Default)]
pub struct NoteFilter {
    pub format_type: Option<NoteFormat>,
    pub tag: Option<String>,
}

#[derive(Debug)]
pub struct NoteFields {
    pub title: String,
    pub content: String,
    pub format_type: NoteFormat,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NoteLinkRow {
    pub id: String,
    #[serde(rename = "from_note")]
    pub from_note_id: String,
    pub from_note_title: String,
    #[serde(rename = "to_note")]
    pub to_note_id: String,
    pub to_note_title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NoteVersionRow {
    pub id: String,
    #[serde(rename = "note")]
    pub note_id: String,
    pub version_number: i64,
    pub title: String,
    pub content: String,
    #[serde(rename = "modifier")]
    pub modifier_id: String,
    pub modifier_name: String,
    pub created_at: DateTime<Utc>,
}

pub async fn list_notes(
    db: &SqlitePool,
    user_id: &str,
    filter: NoteFilter,
    params: &ListParams,
) -> ApiResult<Page<NoteRow>> {
    let mut c = Conditions::new();
    c.eq("n.creator_id", Some(user_id))
        .eq("n.format_type", filter.format_type.map(|f| f.as_str()))
        .search(&["n.title", "n.content"], params.search_term());
    if let Some(tag) = filter.tag {
        c.push(
            "EXISTS (SELECT 1 FROM note_tags ft WHERE ft.note_id = n.id AND ft.tag_id = ?)",
            [SqlValue::from(tag)],
        );
    }
    let order = pagination::order_by(params.ordering.as_deref(), NOTE_ORDERING, "n.updated_at DESC")?;
    pagination::paginate(db, NOTE_SELECT, NOTE_FROM, &c, &order, params).await
}

pub async fn get_note(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<NoteRow> {
    sqlx::query_as(&format!("SELECT {} FROM {} WHERE n.id = ? AND n.creator_id = ?", NOTE_SELECT, NOTE_FROM))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Note"))
}

pub async fn create_note(db: &SqlitePool, user_id: &str, fields: NoteFields, tag_ids: &[String]) -> ApiResult<NoteRow> {
    let id = uuid_utils::generate();
    let now = time::now();

    let mut tx = db.begin().await?;
    sqlx::query(
        "INSERT INTO notes (id, title, content, format_type, creator_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.title)
    .bind(&fields.content)
    .bind(fields.format_type)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    set_tags(&mut tx, "note_tags", "note_id", &id, tag_ids).await?;
    tx.commit().await?;

    get_note(db, &id, user_id).await
}

/// Save new note fields, snapshotting the previous title and content first
/// when either changes
pub async fn update_note(
    db: &SqlitePool,
    current: &NoteRow,
    modifier_id: &str,
    fields: NoteFields,
    tag_ids: Option<&[String]>,
) -> ApiResult<NoteRow> {
    let mut tx = db.begin().await?;

    if fields.title != current.title || fields.content != current.content {
        let next: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version_number), 0) + 1 FROM note_versions WHERE note_id = ?")
                .bind(&current.id)
                .fetch_one(&mut *tx)
                .await?;
        sqlx::query(
            "INSERT INTO note_versions (id, note_id, version_number, title, content, modifier_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_utils::generate())
        .bind(&current.id)
        .bind(next)
        .bind(&current.title)
        .bind(&current.content)
        .bind(modifier_id)
        .bind(time::now())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE notes SET title = ?, content = ?, format_type = ?, updated_at = ? WHERE id = ?")
        .bind(&fields.title)
        .bind(&fields.content)
        .bind(fields.format_type)
        .bind(time::now())
        .bind(&current.id)
        .execute(&mut *tx)
        .await?;
    if let Some(tag_ids) = tag_ids {
        set_tags(&mut tx, "note_tags", "note_id", &current.id, tag_ids).await?;
    }
    tx.commit().await?;

    get_note(db, &current.id, &current.creator_id).await
}

const LINK_SELECT: &str = "SELECT l.id, l.from_note_id, f.title AS from_note_title, l.to_note_id,
    t.title AS to_note_title, l.created_at
    FROM note_links l JOIN notes f ON f.id = l.from_note_id JOIN notes t ON t.id = l.to_note_id";

pub async fn add_link(db: &SqlitePool, from_note_id: &str, to_note_id: &str) -> ApiResult<NoteLinkRow> {
    let id = uuid_utils::generate();
    sqlx::query("INSERT INTO note_links (id, from_note_id, to_note_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(from_note_id)
        .bind(to_note_id)
        .bind(time::now())
        .execute(db)
        .await?;

    Ok(sqlx::query_as(&format!("{} WHERE l.id = ?", LINK_SELECT))
        .bind(&id)
        .fetch_one(db)
        .await?)
}

/// Links leaving and entering a note
pub async fn links(db: &SqlitePool, note_id: &str) -> ApiResult<(Vec<NoteLinkRow>, Vec<NoteLinkRow>)> {
    let outgoing = sqlx::query_as(&format!("{} WHERE l.from_note_id = ? ORDER BY l.created_at DESC", LINK_SELECT))
        .bind(note_id)
        .fetch_all(db)
        .await?;
    let incoming = sqlx::query_as(&format!("{} WHERE l.to_note_id = ? ORDER BY l.created_at DESC", LINK_SELECT))
        .bind(note_id)
        .fetch_all(db)
        .await?;
    Ok((outgoing, incoming))
}

pub async fn versions(db: &SqlitePool, note_id: &str) -> ApiResult<Vec<NoteVersionRow>> {
    Ok(sqlx::query_as(
        "SELECT v.id, v.note_id, v.version_number, v.title, v.content, v.modifier_id,
                u.username AS modifier_name, v.created_at
         FROM note_versions v JOIN users u ON u.id = v.modifier_id
         WHERE v.note_id = ? ORDER BY v.version_number DESC",
    )
    .bind(note_id)
    .fetch_all(db)
    .await?)
}

// ========================================
// Resources
// ========================================

const RESOURCE_SELECT: &str = "r.id, r.name, r.file_path, r.file_type, r.file_size, r.description,
    r.creator_id, r.created_at,
    (SELECT json_group_array(rt.tag_id) FROM resource_tags rt WHERE rt.resource_id = r.id) AS tags";
const RESOURCE_FROM: &str = "resources r";

const RESOURCE_ORDERING: &[(&str, &str)] = &[
    ("created_at", "r.created_at"),
    ("name", "r.name"),
    ("file_size", "r.file_size"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ResourceRow {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub file_type: ResourceType,
    pub file_size: i64,
    pub description: String,
    #[serde(rename = "creator")]
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub tags: Json<Vec<String>>,
}

#[derive(Debug)]
pub struct ResourceFields {
    pub name: String,
    pub file_path: String,
    pub file_type: ResourceType,
    pub file_size: i64,
    pub description: String,
}

pub async fn list_resources(
    db: &SqlitePool,
    user_id: &str,
    file_type: Option<ResourceType>,
    params: &ListParams,
) -> ApiResult<Page<ResourceRow>> {
    let mut c = Conditions::new();
    c.eq("r.creator_id", Some(user_id))
        .eq("r.file_type", file_type.map(|t| t.as_str()))
        .search(&["r.name", "r.description"], params.search_term());
    let order = pagination::order_by(params.ordering.as_deref(), RESOURCE_ORDERING, "r.created_at DESC")?;
    pagination::paginate(db, RESOURCE_SELECT, RESOURCE_FROM, &c, &order, params).await
}

pub async fn get_resource(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<ResourceRow> {
    sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE r.id = ? AND r.creator_id = ?",
        RESOURCE_SELECT, RESOURCE_FROM
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Resource"))
}

pub async fn create_resource(
    db: &SqlitePool,
    user_id: &str,
    fields: ResourceFields,
    tag_ids: &[String],
) -> ApiResult<ResourceRow> {
    let id = uuid_utils::generate();

    let mut tx = db.begin().await?;
    sqlx::query(
        "INSERT INTO resources (id, name, file_path, file_type, file_size, description, creator_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.name)
    .bind(&fields.file_path)
    .bind(fields.file_type)
    .bind(fields.file_size)
    .bind(&fields.description)
    .bind(user_id)
    .bind(time::now())
    .execute(&mut *tx)
    .await?;
    set_tags(&mut tx, "resource_tags", "resource_id", &id, tag_ids).await?;
    tx.commit().await?;

    get_resource(db, &id, user_id).await
}

pub async fn update_resource(
    db: &SqlitePool,
    id: &str,
    user_id: &str,
    fields: ResourceFields,
    tag_ids: Option<&[String]>,
) -> ApiResult<ResourceRow> {
    let mut tx = db.begin().await?;
    sqlx::query(
        "UPDATE resources SET name = ?, file_path = ?, file_type = ?, file_size = ?, description = ?
         WHERE id = ? AND creator_id = ?",
    )
    .bind(&fields.name)
    .bind(&fields.file_path)
    .bind(fields.file_type)
    .bind(fields.file_size)
    .bind(&fields.description)
    .bind(id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    if let Some(tag_ids) = tag_ids {
        set_tags(&mut tx, "resource_tags", "resource_id", id, tag_ids).await?;
    }
    tx.commit().await?;

    get_resource(db, id, user_id).await
}
