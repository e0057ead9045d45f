//! Error response annotation
//!
//! Handlers and inner middleware produce an [`ErrorEnvelope`] without
//! knowing who asked. This outermost layer fills in `request_info`, adds
//! internal details in debug mode, and rewrites the body.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use lifehub_common::api::types::{ErrorEnvelope, RequestInfo};
use serde_json::Value;

use super::rate_limit::client_ip;
use crate::error::{ApiError, InternalDetail};
use crate::extract::AuthUser;
use crate::AppState;

/// Annotate every error envelope with request details
pub async fn request_context_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let ip_address = client_ip(request.headers(), request.extensions().get::<ConnectInfo<SocketAddr>>());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut response = next.run(request).await;

    if response.status() == StatusCode::METHOD_NOT_ALLOWED
        && response.extensions().get::<ErrorEnvelope>().is_none()
    {
        response = ApiError::Request {
            status: StatusCode::METHOD_NOT_ALLOWED,
            code: "METHOD_NOT_ALLOWED",
            message: format!("Method \"{}\" not allowed.", method),
        }
        .into_response();
    }

    let Some(mut envelope) = response.extensions_mut().remove::<ErrorEnvelope>() else {
        return response;
    };

    envelope.request_info = Some(RequestInfo {
        method,
        path,
        user_id: response.extensions().get::<AuthUser>().map(|u| u.id.clone()),
        ip_address,
        user_agent,
    });

    if state.config.server.debug {
        if let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>() {
            if let Value::Object(map) = &mut envelope.details {
                map.insert("debug".to_string(), Value::String(detail.clone()));
            }
        }
    }
    envelope.sanitize();

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    let body = Json(&envelope).into_response().into_body();
    Response::from_parts(parts, body)
}
