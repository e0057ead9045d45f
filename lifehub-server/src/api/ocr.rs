//! Image text recognition endpoints
//!
//! Images arrive base64-encoded and are recognized as soon as they are
//! stored. A failed run is recorded on the image (`status = failed` with
//! `error_message`) rather than returned as an error, so the client can
//! inspect it and retry through `/process`.

use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lifehub_common::db::settings::get_setting_or;
use lifehub_common::models::OcrStatus;
use lifehub_common::patch::merge;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::db::ocr::{self, ImageFields, NewImage, OcrImageRow, Recognition};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::media::{self, IMAGE_EXTENSIONS};
use crate::pagination::{ListParams, Page};
use crate::validate;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/ocr", get(list_images).post(create_image))
        .route("/api/ocr/batch-process", post(batch_process))
        .route(
            "/api/ocr/:id",
            get(get_image).put(update_image).patch(update_image).delete(delete_image),
        )
        .route("/api/ocr/:id/process", post(process_image))
        .route("/api/ocr/:id/export", get(export_text))
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub status: Option<OcrStatus>,
    /// Comma-separated; an image must carry all of them
    pub tags: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateImage {
    pub title: Option<String>,
    /// Base64 image data, optionally as a data URL
    pub image: String,
    pub filename: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Deserialize)]
pub struct UpdateImage {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub image_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub id: String,
    pub success: bool,
    pub status: OcrStatus,
}

#[derive(Debug, Serialize)]
pub struct BatchError {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub processed: usize,
    pub errors: usize,
    pub results: Vec<BatchResult>,
    pub error_details: Vec<BatchError>,
}

/// Human-readable size, e.g. `1.50 KB`
pub fn file_size_display(bytes: i64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} TB", size)
}

/// Image row plus display helpers
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    #[serde(flatten)]
    pub image: OcrImageRow,
    pub file_size_display: String,
}

impl From<OcrImageRow> for ImageResponse {
    fn from(image: OcrImageRow) -> Self {
        let file_size_display = file_size_display(image.file_size);
        Self {
            image,
            file_size_display,
        }
    }
}

fn check_metadata(metadata: &Value) -> ApiResult<()> {
    if metadata.is_object() {
        Ok(())
    } else {
        Err(ApiError::field("metadata", "Expected a JSON object"))
    }
}

/// Run recognition on a stored image and persist the outcome
///
/// The run is detached from the request: a client that disconnects does not
/// leave the image stuck in `processing`.
async fn recognize(state: &AppState, image: OcrImageRow) -> ApiResult<OcrImageRow> {
    let state = state.clone();
    tokio::spawn(async move { run_recognition(&state, image).await })
        .await
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("recognition task failed")))?
}

async fn run_recognition(state: &AppState, image: OcrImageRow) -> ApiResult<OcrImageRow> {
    let limit = Duration::from_secs(state.config.providers.ocr_timeout_secs);
    // Longer than any live run can last
    let stale_after = chrono::Duration::seconds(2 * state.config.providers.ocr_timeout_secs as i64);
    ocr::start_processing(&state.db, &image, stale_after).await?;

    let started = Instant::now();
    let path = media::resolve(&state.media_root, &image.image_path);
    let outcome = match tokio::time::timeout(limit, state.providers.ocr.recognize(&path)).await {
        Ok(Ok(output)) => Recognition::Text {
            metadata: json!({
                "language": output.language,
                "text_length": output.text.chars().count(),
            }),
            text: output.text,
            confidence: output.confidence,
        },
        Ok(Err(e)) => {
            warn!(image = %image.id, "Text recognition failed: {}", e);
            Recognition::Failed(e.to_string())
        }
        Err(_) => {
            warn!(image = %image.id, "Text recognition timed out after {:?}", limit);
            Recognition::Failed(format!("Recognition timed out after {} seconds", limit.as_secs()))
        }
    };
    let elapsed = started.elapsed().as_secs_f64();

    let done = ocr::finish_processing(&state.db, &image, outcome, elapsed).await?;
    info!(image = %done.id, status = %done.status, "Text recognition finished in {:.2}s", elapsed);
    Ok(done)
}

pub async fn list_images(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(query): ApiQuery<ImageQuery>,
) -> ApiResult<Json<Page<ImageResponse>>> {
    let tags: Vec<String> = query
        .tags
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    let page = ocr::list(&state.db, &user.id, query.status, &tags, &params).await?;
    Ok(Json(page.map(ImageResponse::from)))
}

/// POST /api/ocr (also mounted at /api/knowledge/ocr)
pub async fn create_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateImage>,
) -> ApiResult<(StatusCode, Json<ImageResponse>)> {
    let filename = validate::required_text("filename", &req.filename, 255)?;
    let ext = media::extension(&filename)
        .filter(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| {
            ApiError::field(
                "image",
                format!("Unsupported image format, expected one of: {}", IMAGE_EXTENSIONS.join(", ")),
            )
        })?;
    check_metadata(&req.metadata)?;

    let bytes = media::decode_base64("image", &req.image)?;
    let max_bytes: usize = get_setting_or(&state.db, "ocr_max_image_bytes", 10 * 1024 * 1024).await?;
    if bytes.is_empty() {
        return Err(ApiError::field("image", "The submitted file is empty."));
    }
    if bytes.len() > max_bytes {
        return Err(ApiError::field(
            "image",
            format!("Image must not exceed {}", file_size_display(max_bytes as i64)),
        ));
    }

    let title = match req.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => validate::required_text("title", title, 200)?,
        None => filename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(&filename).to_string(),
    };

    let image_path = media::store(&state.media_root, "ocr_images", &ext, &bytes).await?;
    let created = ocr::create(
        &state.db,
        &user.id,
        state.providers.ocr.name(),
        NewImage {
            title,
            image_path: image_path.clone(),
            original_filename: filename,
            file_size: bytes.len() as i64,
            tags: req.tags,
            metadata: req.metadata,
        },
    )
    .await;
    let image = match created {
        Ok(image) => image,
        Err(e) => {
            media::remove(&state.media_root, &image_path).await;
            return Err(e);
        }
    };

    let image = recognize(&state, image).await?;
    Ok((StatusCode::CREATED, Json(image.into())))
}

pub async fn get_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<ImageResponse>> {
    Ok(Json(ocr::get(&state.db, &id, &user.id).await?.into()))
}

pub async fn update_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateImage>,
) -> ApiResult<Json<ImageResponse>> {
    let current = ocr::get(&state.db, &id, &user.id).await?;
    let fields = ImageFields {
        title: validate::required_text("title", &merge(current.title, req.title), 200)?,
        tags: merge(current.tags.0, req.tags),
        metadata: merge(current.metadata.0, req.metadata),
    };
    check_metadata(&fields.metadata)?;
    Ok(Json(ocr::update(&state.db, &id, &user.id, fields).await?.into()))
}

pub async fn delete_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    let image = ocr::get(&state.db, &id, &user.id).await?;
    crate::db::delete_owned(&state.db, "ocr_images", "user_id", &id, &user.id, "Image").await?;
    media::remove(&state.media_root, &image.image_path).await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/ocr/:id/process
pub async fn process_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<ImageResponse>> {
    let image = ocr::get(&state.db, &id, &user.id).await?;
    Ok(Json(recognize(&state, image).await?.into()))
}

/// Attachment filename limited to characters every header accepts
fn export_filename(title: &str, ext: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') { c } else { '_' })
        .collect();
    let stem = stem.trim();
    format!("{}.{}", if stem.is_empty() { "export" } else { stem }, ext)
}

/// GET /api/ocr/:id/export?format=txt|json
pub async fn export_text(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<ExportQuery>,
) -> ApiResult<Response> {
    let image = ocr::get(&state.db, &id, &user.id).await?;
    let format = query.format.unwrap_or_else(|| "txt".to_string());

    let (content_type, body) = match format.as_str() {
        "txt" => ("text/plain; charset=utf-8", image.extracted_text.clone()),
        "json" => {
            let data = json!({
                "title": image.title,
                "extracted_text": image.extracted_text,
                "confidence_score": image.confidence_score,
                "metadata": image.metadata.0,
                "created_at": image.created_at.to_rfc3339(),
            });
            ("application/json", data.to_string())
        }
        other => {
            return Err(ApiError::field("format", format!("Unsupported export format '{}'", other)));
        }
    };

    let disposition = format!("attachment; filename=\"{}\"", export_filename(&image.title, &format));
    Ok((
        [(header::CONTENT_TYPE, content_type.to_string()), (header::CONTENT_DISPOSITION, disposition)],
        body,
    )
        .into_response())
}

/// POST /api/ocr/batch-process
///
/// Images that are missing or already processing are reported per id and
/// do not stop the batch.
pub async fn batch_process(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<BatchRequest>,
) -> ApiResult<Json<BatchResponse>> {
    if req.image_ids.is_empty() {
        return Err(ApiError::field("image_ids", "Provide at least one image id"));
    }
    let limit: usize = get_setting_or(&state.db, "ocr_batch_limit", 20).await?;
    if req.image_ids.len() > limit {
        return Err(ApiError::field(
            "image_ids",
            format!("At most {} images can be processed at once", limit),
        ));
    }

    let mut results = Vec::new();
    let mut error_details = Vec::new();
    for id in req.image_ids {
        let outcome = match ocr::get(&state.db, &id, &user.id).await {
            Ok(image) => recognize(&state, image).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(image) => results.push(BatchResult {
                id: image.id,
                success: image.status == OcrStatus::Completed,
                status: image.status,
            }),
            Err(e) => error_details.push(BatchError { id, error: e.to_string() }),
        }
    }

    Ok(Json(BatchResponse {
        processed: results.len(),
        errors: error_details.len(),
        results,
        error_details,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_size_display() {
        assert_eq!(file_size_display(0), "0.00 B");
        assert_eq!(file_size_display(1536), "1.50 KB");
        assert_eq!(file_size_display(10 * 1024 * 1024), "10.00 MB");
    }

    #[test]
    fn test_export_filename_is_header_safe() {
        assert_eq!(export_filename("Receipt 2024", "txt"), "Receipt 2024.txt");
        assert_eq!(export_filename("发票\"x", "json"), "___x.json");
        assert_eq!(export_filename("  ", "txt"), "export.txt");
    }
}
