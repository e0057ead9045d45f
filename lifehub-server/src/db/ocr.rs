//! Stored images and their recognized text

use chrono::{DateTime, Utc};
use lifehub_common::models::OcrStatus;
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{types::Json, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{self, Conditions, ListParams, Page, SqlValue};

const SELECT: &str = "o.id, o.user_id, o.title, o.image_path, o.original_filename, o.file_size, o.extracted_text,
    o.confidence_score, o.status, o.error_message, o.ocr_provider, o.processing_time, o.tags, o.metadata,
    o.created_at, o.updated_at";
const FROM: &str = "ocr_images o";

const ORDERING: &[(&str, &str)] = &[
    ("created_at", "o.created_at"),
    ("updated_at", "o.updated_at"),
    ("title", "o.title"),
    ("file_size", "o.file_size"),
];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OcrImageRow {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    pub title: String,
    #[serde(rename = "image")]
    pub image_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub extracted_text: String,
    pub confidence_score: Option<f64>,
    pub status: OcrStatus,
    pub error_message: String,
    pub ocr_provider: String,
    pub processing_time: Option<f64>,
    pub tags: Json<Vec<String>>,
    pub metadata: Json<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewImage {
    pub title: String,
    pub image_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub tags: Vec<String>,
    pub metadata: Value,
}

/// Editable descriptive fields
#[derive(Debug)]
pub struct ImageFields {
    pub title: String,
    pub tags: Vec<String>,
    pub metadata: Value,
}

/// Result of one recognition run
#[derive(Debug)]
pub enum Recognition {
    Text {
        text: String,
        confidence: Option<f64>,
        metadata: Value,
    },
    Failed(String),
}

/// List images, optionally by status and carrying every tag in `tags`
pub async fn list(
    db: &SqlitePool,
    user_id: &str,
    status: Option<OcrStatus>,
    tags: &[String],
    params: &ListParams,
) -> ApiResult<Page<OcrImageRow>> {
    let mut c = Conditions::new();
    c.eq("o.user_id", Some(user_id))
        .eq("o.status", status.map(|s| s.as_str()))
        .search(&["o.title", "o.extracted_text"], params.search_term());
    for tag in tags {
        c.push(
            "EXISTS (SELECT 1 FROM json_each(o.tags) WHERE json_each.value = ?)",
            [SqlValue::from(tag)],
        );
    }
    let order = pagination::order_by(params.ordering.as_deref(), ORDERING, "o.created_at DESC")?;
    pagination::paginate(db, SELECT, FROM, &c, &order, params).await
}

pub async fn get(db: &SqlitePool, id: &str, user_id: &str) -> ApiResult<OcrImageRow> {
    sqlx::query_as(&format!("SELECT {} FROM {} WHERE o.id = ? AND o.user_id = ?", SELECT, FROM))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Image"))
}

pub async fn create(db: &SqlitePool, user_id: &str, provider: &str, image: NewImage) -> ApiResult<OcrImageRow> {
    let id = uuid_utils::generate();
    let now = time::now();
    sqlx::query(
        "INSERT INTO ocr_images (id, user_id, title, image_path, original_filename, file_size, status,
            ocr_provider, tags, metadata, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(&image.title)
    .bind(&image.image_path)
    .bind(&image.original_filename)
    .bind(image.file_size)
    .bind(OcrStatus::Pending)
    .bind(provider)
    .bind(Json(&image.tags))
    .bind(Json(&image.metadata))
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    get(db, &id, user_id).await
}

pub async fn update(db: &SqlitePool, id: &str, user_id: &str, fields: ImageFields) -> ApiResult<OcrImageRow> {
    sqlx::query("UPDATE ocr_images SET title = ?, tags = ?, metadata = ?, updated_at = ? WHERE id = ? AND user_id = ?")
        .bind(&fields.title)
        .bind(Json(&fields.tags))
        .bind(Json(&fields.metadata))
        .bind(time::now())
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;

    get(db, id, user_id).await
}

/// Move an image into `processing`, clearing any previous error
///
/// Fails with `OCR_INVALID_STATE` when the image is already being processed.
/// Move an image to `processing`
///
/// A run that has been `processing` for longer than `stale_after` is
/// considered abandoned and may be restarted.
pub async fn start_processing(db: &SqlitePool, image: &OcrImageRow, stale_after: chrono::Duration) -> ApiResult<()> {
    let abandoned = image.status == OcrStatus::Processing && time::now() - image.updated_at > stale_after;
    if !abandoned && !image.status.can_transition_to(OcrStatus::Processing) {
        return Err(ApiError::business(
            "OCR_INVALID_STATE",
            format!("Image is {} and cannot be processed now", image.status),
        ));
    }
    let result = sqlx::query(
        "UPDATE ocr_images SET status = ?, error_message = '', updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(OcrStatus::Processing)
    .bind(time::now())
    .bind(&image.id)
    .bind(image.status)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict("Image status changed concurrently".to_string()));
    }
    Ok(())
}

/// Record the outcome of a recognition run started with [`start_processing`]
pub async fn finish_processing(
    db: &SqlitePool,
    image: &OcrImageRow,
    outcome: Recognition,
    processing_time: f64,
) -> ApiResult<OcrImageRow> {
    let now = time::now();
    match outcome {
        Recognition::Text {
            text,
            confidence,
            metadata,
        } => {
            let merged = merge_metadata(&image.metadata.0, metadata);
            sqlx::query(
                "UPDATE ocr_images SET status = ?, extracted_text = ?, confidence_score = ?, processing_time = ?,
                    metadata = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(OcrStatus::Completed)
            .bind(&text)
            .bind(confidence)
            .bind(processing_time)
            .bind(Json(&merged))
            .bind(now)
            .bind(&image.id)
            .execute(db)
            .await?;
        }
        Recognition::Failed(message) => {
            sqlx::query(
                "UPDATE ocr_images SET status = ?, error_message = ?, processing_time = ?, updated_at = ? WHERE id = ?",
            )
            .bind(OcrStatus::Failed)
            .bind(&message)
            .bind(processing_time)
            .bind(now)
            .bind(&image.id)
            .execute(db)
            .await?;
        }
    }

    get(db, &image.id, &image.user_id).await
}

/// Overlay `update`'s keys onto an object; non-object metadata is replaced
fn merge_metadata(current: &Value, update: Value) -> Value {
    let mut merged = match current {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(extra) = update {
        merged.extend(extra);
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_metadata_overlays_keys() {
        let merged = merge_metadata(&json!({"source": "scanner", "language": "eng"}), json!({"language": "chi_sim"}));
        assert_eq!(merged, json!({"source": "scanner", "language": "chi_sim"}));

        let merged = merge_metadata(&json!([1, 2]), json!({"words": 3}));
        assert_eq!(merged, json!({"words": 3}));
    }
}
