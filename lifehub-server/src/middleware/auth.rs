//! Bearer token authentication middleware

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use lifehub_common::api::auth::TokenKind;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::extract::AuthUser;
use crate::AppState;

/// Read the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
///
/// Verifies the access token, loads the user and stores an [`AuthUser`] in
/// the request extensions. The same value is copied to the response so the
/// error annotator can report who made the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::Authentication("Authentication credentials were not provided".to_string()))?;

    let claims = state.tokens.verify(token, TokenKind::Access).map_err(|e| {
        debug!("Rejected access token: {}", e);
        ApiError::Authentication("Given token not valid for any token type".to_string())
    })?;

    let user: Option<(String, String, bool)> =
        sqlx::query_as("SELECT id, username, is_active FROM users WHERE id = ?")
            .bind(&claims.sub)
            .fetch_optional(&state.db)
            .await?;

    let user = match user {
        Some((id, username, true)) => AuthUser { id, username },
        Some(_) => return Err(ApiError::Authentication("User is inactive".to_string())),
        None => return Err(ApiError::Authentication("User not found".to_string())),
    };

    request.extensions_mut().insert(user.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(user);
    Ok(response)
}
