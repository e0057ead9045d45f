//! Integration tests for text recognition and the weather, translation and map services

mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use base64::{engine::general_purpose, Engine as _};
use helpers::{setup, setup_with_ocr, test_config, SlowOcr, TestApp, TestUser};
use serde_json::{json, Value};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nstub image";

async fn upload(app: &TestApp, user: &TestUser, filename: &str, bytes: &[u8]) -> Value {
    let response = app
        .post(
            "/api/ocr",
            user,
            json!({
                "image": general_purpose::STANDARD.encode(bytes),
                "filename": filename,
                "tags": ["receipt"],
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "upload failed: {}", response.text);
    response.body
}

#[tokio::test]
async fn test_upload_is_recognized_immediately() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let image = upload(&app, &alice, "Lunch Receipt.png", PNG_BYTES).await;
    assert_eq!(image["status"], "completed");
    assert_eq!(image["extracted_text"], "Hello OCR");
    assert_eq!(image["confidence_score"], 91.5);
    assert_eq!(image["title"], "Lunch Receipt");
    assert_eq!(image["ocr_provider"], "stub");
    assert_eq!(image["metadata"]["language"], "eng");
    assert_eq!(image["file_size"], PNG_BYTES.len());

    let stored = app.media_root().join(image["image"].as_str().unwrap());
    assert!(stored.exists(), "image should be stored under the media root");

    let by_tag = app.get("/api/ocr?tags=receipt", &alice).await;
    assert_eq!(by_tag.body["count"], 1);
    let other_tag = app.get("/api/ocr?tags=receipt,invoice", &alice).await;
    assert_eq!(other_tag.body["count"], 0);
}

#[tokio::test]
async fn test_failed_recognition_is_recorded() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let image = upload(&app, &alice, "blurry.jpg", b"FAIL image").await;
    assert_eq!(image["status"], "failed");
    assert!(image["error_message"].as_str().unwrap().contains("unreadable image"));
    assert_eq!(image["extracted_text"], "");

    // Retrying a failed image runs recognition again
    let id = image["id"].as_str().unwrap();
    let retried = app.post(&format!("/api/ocr/{}/process", id), &alice, json!({})).await;
    assert_eq!(retried.status, StatusCode::OK);
    assert_eq!(retried.body["status"], "failed");

    let failed = app.get("/api/ocr?status=failed", &alice).await;
    assert_eq!(failed.body["count"], 1);
    let pending = app.get("/api/ocr?status=pending", &alice).await;
    assert_eq!(pending.body["count"], 0);
}

#[tokio::test]
async fn test_upload_validation() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let wrong_type = app
        .post(
            "/api/ocr",
            &alice,
            json!({"image": general_purpose::STANDARD.encode(PNG_BYTES), "filename": "notes.pdf"}),
        )
        .await;
    assert_eq!(wrong_type.status, StatusCode::BAD_REQUEST);
    assert!(wrong_type.body["details"]["field_errors"]["image"].is_array());

    let not_base64 = app
        .post("/api/ocr", &alice, json!({"image": "***", "filename": "a.png"}))
        .await;
    assert_eq!(not_base64.status, StatusCode::BAD_REQUEST);

    let empty = app.post("/api/ocr", &alice, json!({"image": "", "filename": "a.png"})).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let bad_metadata = app
        .post(
            "/api/ocr",
            &alice,
            json!({"image": general_purpose::STANDARD.encode(PNG_BYTES), "filename": "a.png", "metadata": [1, 2]}),
        )
        .await;
    assert_eq!(bad_metadata.status, StatusCode::BAD_REQUEST);

    // Data URLs are accepted through the knowledge alias too
    let data_url = format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(PNG_BYTES));
    let aliased = app
        .post("/api/knowledge/ocr", &alice, json!({"image": data_url, "filename": "scan.png"}))
        .await;
    assert_eq!(aliased.status, StatusCode::CREATED, "{}", aliased.text);
}

#[tokio::test]
async fn test_export_formats() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let image = upload(&app, &alice, "scan.png", PNG_BYTES).await;
    let id = image["id"].as_str().unwrap();

    let txt = app.get(&format!("/api/ocr/{}/export", id), &alice).await;
    assert_eq!(txt.status, StatusCode::OK);
    assert_eq!(txt.text, "Hello OCR");
    assert!(txt.headers["content-type"].to_str().unwrap().starts_with("text/plain"));
    assert_eq!(txt.headers["content-disposition"], "attachment; filename=\"scan.txt\"");

    let json_export = app.get(&format!("/api/ocr/{}/export?format=json", id), &alice).await;
    assert_eq!(json_export.body["extracted_text"], "Hello OCR");
    assert_eq!(json_export.body["confidence_score"], 91.5);
    assert_eq!(json_export.headers["content-disposition"], "attachment; filename=\"scan.json\"");

    let pdf = app.get(&format!("/api/ocr/{}/export?format=pdf", id), &alice).await;
    assert_eq!(pdf.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_process_reports_per_image() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let mallory = app.register("mallory").await;

    let good = upload(&app, &alice, "good.png", PNG_BYTES).await;
    let bad = upload(&app, &alice, "bad.png", b"FAIL").await;
    let foreign = upload(&app, &mallory, "theirs.png", PNG_BYTES).await;

    let response = app
        .post(
            "/api/ocr/batch-process",
            &alice,
            json!({"image_ids": [good["id"], bad["id"], foreign["id"]]}),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["processed"], 2);
    assert_eq!(response.body["errors"], 1);
    assert_eq!(response.body["results"][0]["success"], true);
    assert_eq!(response.body["results"][1]["success"], false);
    assert_eq!(response.body["error_details"][0]["id"], foreign["id"]);

    let empty = app.post("/api/ocr/batch-process", &alice, json!({"image_ids": []})).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let too_many: Vec<String> = (0..21).map(|i| format!("id-{}", i)).collect();
    let over_limit = app
        .post("/api/ocr/batch-process", &alice, json!({"image_ids": too_many}))
        .await;
    assert_eq!(over_limit.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_removes_stored_file() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let image = upload(&app, &alice, "scan.png", PNG_BYTES).await;
    let stored = app.media_root().join(image["image"].as_str().unwrap());

    let deleted = app.delete(&format!("/api/ocr/{}", image["id"].as_str().unwrap()), &alice).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert!(!stored.exists());
}

#[tokio::test]
async fn test_weather_is_logged_and_cached() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let first = app.post("/api/services/weather", &alice, json!({"city": "Hangzhou"})).await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.text);
    assert_eq!(first.body["temperature"], 21.5);
    assert_eq!(first.body["weather_main"], "Clouds");

    // Same request from another user is served from the cache but still logged
    let second = app.post("/api/services/weather", &bob, json!({"city": "hangzhou"})).await;
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(app.weather_calls.load(Ordering::SeqCst), 1);

    let history = app.get("/api/services/weather", &bob).await;
    assert_eq!(history.body["count"], 1);

    let bad_units = app
        .post("/api/services/weather", &alice, json!({"city": "Hangzhou", "units": "rankine"}))
        .await;
    assert_eq!(bad_units.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_units.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_weather_provider_failure() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let response = app.post("/api/services/weather", &alice, json!({"city": "Atlantis"})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
    assert!(response.body["error"].is_string());

    let history = app.get("/api/services/weather", &alice).await;
    assert_eq!(history.body["count"], 0);
}

#[tokio::test]
async fn test_translation_records() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let response = app
        .post(
            "/api/services/translation",
            &alice,
            json!({"text": "good morning", "target_language": "zh"}),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    assert_eq!(response.body["target_text"], "GOOD MORNING");
    assert_eq!(response.body["source_language"], "en");

    let by_keyword = app.get("/api/services/translation?keyword=morning", &alice).await;
    assert_eq!(by_keyword.body["count"], 1);
    let by_target = app.get("/api/services/translation?target_language=fr", &alice).await;
    assert_eq!(by_target.body["count"], 0);

    let missing = app
        .post("/api/services/translation", &alice, json!({"text": "  ", "target_language": "zh"}))
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_map_search_geocode_and_edit() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let search = app.post("/api/services/map", &alice, json!({"query": "West Lake"})).await;
    assert_eq!(search.status, StatusCode::OK, "{}", search.text);
    assert_eq!(search.body["total_found"], 2);
    assert_eq!(search.body["saved_count"], 2);
    assert_eq!(search.body["search_results"][0]["name"], "West Lake A");

    let geocoded = app
        .post("/api/services/map/geocode", &alice, json!({"address": "1 Lake Road"}))
        .await;
    assert_eq!(geocoded.status, StatusCode::CREATED);
    let id = geocoded.body["id"].as_str().unwrap().to_string();

    let edited = app
        .patch(
            &format!("/api/services/map/{}", id),
            &alice,
            json!({"category": "favorite", "tags": ["home"]}),
        )
        .await;
    assert_eq!(edited.status, StatusCode::OK);
    assert_eq!(edited.body["category"], "favorite");
    assert_eq!(edited.body["tags"], json!(["home"]));
    assert_eq!(edited.body["latitude"], 30.26);

    let out_of_range = app
        .patch(&format!("/api/services/map/{}", id), &alice, json!({"latitude": 95.0}))
        .await;
    assert_eq!(out_of_range.status, StatusCode::BAD_REQUEST);

    let favorites = app.get("/api/services/map?category=favorite", &alice).await;
    assert_eq!(favorites.body["count"], 1);
    let all = app.get("/api/services/map", &alice).await;
    assert_eq!(all.body["count"], 3);
}

fn files_under(dir: &std::path::Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                files_under(&path)
            } else {
                1
            }
        })
        .sum()
}

async fn open_db(app: &TestApp) -> sqlx::SqlitePool {
    sqlx::SqlitePool::connect(&format!("sqlite://{}", app.database_path().display()))
        .await
        .expect("Should open test database")
}

#[tokio::test]
async fn test_recognition_survives_disconnected_client() {
    let app = setup_with_ocr(
        test_config(),
        Arc::new(SlowOcr {
            delay: Duration::from_millis(600),
        }),
    )
    .await;
    let alice = app.register("alice").await;

    let body = json!({
        "image": general_purpose::STANDARD.encode(PNG_BYTES),
        "filename": "scan.png",
    });
    let dropped = tokio::time::timeout(Duration::from_millis(200), app.post("/api/ocr", &alice, body)).await;
    assert!(dropped.is_err(), "upload should still be running when the client gives up");

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let list = app.get("/api/ocr", &alice).await;
    assert_eq!(list.body["count"], 1);
    assert_eq!(list.body["results"][0]["status"], "completed");
    assert_eq!(list.body["results"][0]["extracted_text"], "Hello OCR");
}

#[tokio::test]
async fn test_slow_engine_times_out_as_failed() {
    let mut config = test_config();
    config.providers.ocr_timeout_secs = 1;
    let app = setup_with_ocr(
        config,
        Arc::new(SlowOcr {
            delay: Duration::from_secs(5),
        }),
    )
    .await;
    let alice = app.register("alice").await;

    let image = upload(&app, &alice, "scan.png", PNG_BYTES).await;
    assert_eq!(image["status"], "failed");
    assert!(image["error_message"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_abandoned_processing_can_be_restarted() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let image = upload(&app, &alice, "scan.png", PNG_BYTES).await;
    let id = image["id"].as_str().unwrap().to_string();
    let db = open_db(&app).await;

    sqlx::query("UPDATE ocr_images SET status = 'processing', updated_at = ? WHERE id = ?")
        .bind(chrono::Utc::now())
        .bind(&id)
        .execute(&db)
        .await
        .unwrap();
    let busy = app.post(&format!("/api/ocr/{}/process", id), &alice, json!({})).await;
    assert_eq!(busy.status, StatusCode::BAD_REQUEST);
    assert_eq!(busy.body["code"], "OCR_INVALID_STATE");

    sqlx::query("UPDATE ocr_images SET updated_at = ? WHERE id = ?")
        .bind(chrono::Utc::now() - chrono::Duration::hours(1))
        .bind(&id)
        .execute(&db)
        .await
        .unwrap();
    let restarted = app.post(&format!("/api/ocr/{}/process", id), &alice, json!({})).await;
    assert_eq!(restarted.status, StatusCode::OK, "{}", restarted.text);
    assert_eq!(restarted.body["status"], "completed");
}

#[tokio::test]
async fn test_rejected_insert_leaves_no_stored_file() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let db = open_db(&app).await;
    sqlx::query(
        "CREATE TRIGGER reject_images BEFORE INSERT ON ocr_images
         BEGIN SELECT RAISE(ABORT, 'insert rejected'); END",
    )
    .execute(&db)
    .await
    .unwrap();

    let response = app
        .post(
            "/api/ocr",
            &alice,
            json!({
                "image": general_purpose::STANDARD.encode(PNG_BYTES),
                "filename": "scan.png",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(files_under(&app.media_root()), 0);
}

#[tokio::test]
async fn test_images_and_locations_are_private() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let mallory = app.register("mallory").await;

    let image = upload(&app, &alice, "passport.png", PNG_BYTES).await;
    let image_id = image["id"].as_str().unwrap().to_string();
    for uri in [
        format!("/api/ocr/{}", image_id),
        format!("/api/ocr/{}/export?format=txt", image_id),
    ] {
        let response = app.get(&uri, &mallory).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{}", uri);
    }
    let reprocess = app.post(&format!("/api/ocr/{}/process", image_id), &mallory, json!({})).await;
    assert_eq!(reprocess.status, StatusCode::NOT_FOUND);
    let delete = app.delete(&format!("/api/ocr/{}", image_id), &mallory).await;
    assert_eq!(delete.status, StatusCode::NOT_FOUND);

    let location = app
        .post("/api/services/map/geocode", &alice, json!({"address": "7 Home Lane"}))
        .await;
    assert_eq!(location.status, StatusCode::CREATED);
    let location_id = location.body["id"].as_str().unwrap().to_string();
    let read = app.get(&format!("/api/services/map/{}", location_id), &mallory).await;
    assert_eq!(read.status, StatusCode::NOT_FOUND);
    assert_eq!(read.body["code"], "NOT_FOUND");
    let edit = app
        .patch(&format!("/api/services/map/{}", location_id), &mallory, json!({"category": "favorite"}))
        .await;
    assert_eq!(edit.status, StatusCode::NOT_FOUND);

    assert_eq!(app.get("/api/ocr", &mallory).await.body["count"], 0);
    assert_eq!(app.get("/api/services/map", &mallory).await.body["count"], 0);
    assert_eq!(app.get(&format!("/api/ocr/{}", image_id), &alice).await.status, StatusCode::OK);
}
