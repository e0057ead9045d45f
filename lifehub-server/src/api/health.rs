//! Health check and API info endpoints

use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// GET /health
///
/// Does not require authentication.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "lifehub-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /
pub async fn api_info() -> Json<Value> {
    Json(json!({
        "name": "LifeHub API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/api/auth/",
            "tasks": "/api/tasks/",
            "time": "/api/time/",
            "knowledge": "/api/knowledge/",
            "life": "/api/life/",
            "ocr": "/api/ocr/",
            "services": "/api/services/",
        },
    }))
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound("The requested resource was not found".to_string())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(api_info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_ok() {
        let Json(body) = health_check().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.module, "lifehub-server");
    }

    #[tokio::test]
    async fn test_not_found_is_404() {
        let err = not_found().await;
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
