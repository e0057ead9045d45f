//! Cached JSON responses for read-heavy endpoints
//!
//! A cached endpoint stores its JSON body per user and query string. Hits
//! answer with `X-Cache: HIT`; misses run the handler, store the body with
//! `_cache_metadata` and answer with `X-Cache: MISS`.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{request::Parts, HeaderValue, Method},
    response::{IntoResponse, Response},
    Json,
};
use lifehub_common::cache::{api_key, endpoint_pattern};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ApiResult;
use crate::extract::AuthUser;
use crate::AppState;

/// Method and raw query parameters of a cacheable request
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub method: Method,
    pub params: BTreeMap<String, String>,
}

impl CacheRequest {
    fn bypass(&self) -> bool {
        self.method != Method::GET
            || matches!(self.params.get("nocache").map(String::as_str), Some("1") | Some("true"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CacheRequest
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = Query::<BTreeMap<String, String>>::from_request_parts(parts, state)
            .await
            .map(|Query(p)| p)
            .unwrap_or_default();
        Ok(CacheRequest {
            method: parts.method.clone(),
            params,
        })
    }
}

/// Serve `endpoint` from the cache or run `produce` and store its result
pub async fn cached_json<F, Fut>(
    state: &AppState,
    user: &AuthUser,
    request: &CacheRequest,
    endpoint: &str,
    category: &str,
    produce: F,
) -> ApiResult<Response>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<Value>>,
{
    let ttl = state.config.cache.for_category(category);
    let ttl_header = HeaderValue::from(ttl.as_secs());

    if request.bypass() {
        let body = produce().await?;
        return Ok(Json(body).into_response());
    }

    let key = api_key(endpoint, &request.params, Some(&user.id));
    if let Some(hit) = state.cache.get_value(&key).await {
        debug!("Response cache hit: {}", key);
        let mut response = Json(hit).into_response();
        response.headers_mut().insert("x-cache", HeaderValue::from_static("HIT"));
        response.headers_mut().insert("x-cache-ttl", ttl_header);
        return Ok(response);
    }

    let started = Instant::now();
    let body = produce().await?;

    let mut stored = body.clone();
    if let Value::Object(map) = &mut stored {
        map.insert(
            "_cache_metadata".to_string(),
            json!({
                "cached_at": lifehub_common::time::now().to_rfc3339(),
                "processing_time": started.elapsed().as_secs_f64(),
                "cache_ttl": ttl.as_secs(),
            }),
        );
    }
    state.cache.set(&key, &stored, Some(ttl)).await;
    debug!("Response cache miss: {}", key);

    let mut response = Json(body).into_response();
    response.headers_mut().insert("x-cache", HeaderValue::from_static("MISS"));
    response.headers_mut().insert("x-cache-ttl", ttl_header);
    Ok(response)
}

/// Drop cached responses of every endpoint starting with `prefix` for one user
pub async fn invalidate(state: &AppState, user_id: &str, prefix: &str) {
    let removed = state.cache.delete_pattern(&endpoint_pattern(prefix, Some(user_id))).await;
    if removed > 0 {
        debug!("Invalidated {} cached responses under {}", removed, prefix);
    }
}
