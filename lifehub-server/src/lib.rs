//! lifehub-server library
//!
//! REST API for personal task, time, knowledge and life management.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    Router,
};
use lifehub_common::api::auth::TokenService;
use lifehub_common::cache::CacheStore;
use lifehub_common::config::TomlConfig;
use sqlx::SqlitePool;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod db;
pub mod error;
pub mod extract;
pub mod media;
pub mod middleware;
pub mod pagination;
pub mod providers;
pub mod response_cache;
pub mod validate;

use providers::Providers;

/// Largest accepted request body (base64 images included)
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<TomlConfig>,
    pub tokens: TokenService,
    pub cache: Arc<CacheStore>,
    pub limiter: Arc<middleware::RateLimiter>,
    pub providers: Providers,
    /// Uploaded files live under this folder
    pub media_root: PathBuf,
}

impl AppState {
    /// Create application state with the configured third-party adapters
    pub fn new(
        db: SqlitePool,
        config: TomlConfig,
        jwt_secret: &str,
        media_root: PathBuf,
    ) -> anyhow::Result<Self> {
        let providers = Providers::from_config(&config.providers)?;
        Ok(Self::with_providers(db, config, jwt_secret, media_root, providers))
    }

    /// Create application state with explicit adapters
    pub fn with_providers(
        db: SqlitePool,
        config: TomlConfig,
        jwt_secret: &str,
        media_root: PathBuf,
        providers: Providers,
    ) -> Self {
        let tokens = TokenService::new(
            jwt_secret.as_bytes(),
            chrono::Duration::minutes(config.auth.access_token_minutes),
            chrono::Duration::days(config.auth.refresh_token_days),
        );
        let cache = Arc::new(CacheStore::new(config.cache.for_category("default")));
        let limiter = Arc::new(middleware::RateLimiter::new(&config.rate_limit));
        Self {
            db,
            config: Arc::new(config),
            tokens,
            cache,
            limiter,
            providers,
            media_root,
        }
    }
}

/// Build application router
///
/// Health, API info and the login/registration endpoints are public; every
/// other route requires a bearer access token.
pub fn build_router(state: AppState) -> Router {
    // Protected routes (require authentication); auth runs before throttling
    let protected = Router::new()
        .merge(api::users::routes())
        .merge(api::projects::routes())
        .merge(api::tasks::routes())
        .merge(api::calendar::routes())
        .merge(api::tracking::routes())
        .merge(api::knowledge::routes())
        .merge(api::packages::routes())
        .merge(api::items::routes())
        .merge(api::habits::routes())
        .merge(api::meals::routes())
        .merge(api::finance::routes())
        .merge(api::ocr::routes())
        .merge(api::services::routes())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    // Public routes (no authentication)
    let public = Router::new()
        .merge(api::health::routes())
        .merge(api::users::public_routes())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware));

    Router::new()
        .merge(protected)
        .merge(public)
        .fallback(api::health::not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), middleware::request_context_middleware))
        .with_state(state)
}

/// Turn a handler panic into the generic 500 error envelope
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error::ApiError::Internal(anyhow::anyhow!("handler panicked: {}", message)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn test_panic_becomes_error_envelope() {
        let app: Router = Router::new()
            .route(
                "/boom",
                get(|| async {
                    if StatusCode::OK.is_success() {
                        panic!("boom");
                    }
                    StatusCode::OK
                }),
            )
            .layer(CatchPanicLayer::custom(panic_response));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-error-code"], "UNKNOWN_ERROR");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "UNKNOWN_ERROR");
        assert_eq!(body["message"], "Internal server error");
        assert!(body["error_id"].is_string());
    }
}
