//! Error types for lifehub-server
//!
//! Every handler returns [`ApiResult`]. An [`ApiError`] turns into the
//! normalized error envelope; the request-context middleware later fills in
//! `request_info` and, in debug mode, the internal error chain.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use lifehub_common::api::types::ErrorEnvelope;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

/// Internal description of an unhandled error, exposed only in debug mode
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid input (400) with per-field messages
    #[error("{message}")]
    Validation { message: String, field_errors: Value },

    /// Missing or invalid credentials (401)
    #[error("{0}")]
    Authentication(String),

    /// Authenticated but not allowed (403)
    #[error("{0}")]
    Authorization(String),

    /// Resource not found or not visible to the caller (404)
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness or state conflict (409)
    #[error("{0}")]
    Conflict(String),

    /// Too many requests (429)
    #[error("{message}")]
    RateLimited { message: String, retry_after: u64 },

    /// Dependency temporarily unavailable (503)
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Domain rule violation (400) with a caller-chosen code
    #[error("{message}")]
    Business { code: String, message: String },

    /// Upstream API failure (502)
    #[error("{service}: {message}")]
    ThirdParty { service: String, message: String },

    /// Request the framework could not decode
    #[error("{message}")]
    Request { status: StatusCode, code: &'static str, message: String },

    /// Anything else (500)
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            field_errors: json!({}),
        }
    }

    /// Validation failure attributed to one field
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        ApiError::Validation {
            message: format!("{}: {}", field, message),
            field_errors: json!({ field: [message] }),
        }
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn business(code: &str, message: impl Into<String>) -> Self {
        ApiError::Business {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::Business { .. } => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ThirdParty { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Request { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::Authentication(_) => "AUTHENTICATION_ERROR",
            ApiError::Authorization(_) => "AUTHORIZATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Business { code, .. } => code,
            ApiError::ThirdParty { .. } => "THIRD_PARTY_API_ERROR",
            ApiError::Request { code, .. } => code,
            ApiError::Internal(_) => "UNKNOWN_ERROR",
        }
    }

    fn details(&self) -> Value {
        match self {
            ApiError::Validation { field_errors, .. } => json!({ "field_errors": field_errors }),
            ApiError::RateLimited { retry_after, .. } => json!({ "retry_after": retry_after }),
            ApiError::ThirdParty { service, .. } => json!({ "service": service }),
            _ => json!({}),
        }
    }

    /// Build the sanitized envelope without request context
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let message = match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let mut envelope =
            ErrorEnvelope::new(self.code(), message, self.status().as_u16(), self.details());
        envelope.sanitize();
        envelope
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = self.to_envelope();

        match &self {
            ApiError::Internal(err) => error!(
                "Unhandled error [{}]: {:#}",
                envelope.error_id, err
            ),
            other => warn!(
                "API error [{}]: {} - {}",
                envelope.error_id,
                other.code(),
                other
            ),
        }

        let mut response = (status, Json(&envelope)).into_response();
        if let Ok(v) = HeaderValue::from_str(&envelope.error_id.to_string()) {
            response.headers_mut().insert("x-error-id", v);
        }
        if let Ok(v) = HeaderValue::from_str(&envelope.code) {
            response.headers_mut().insert("x-error-code", v);
        }
        if let ApiError::RateLimited { retry_after, .. } = &self {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(*retry_after));
        }
        if let ApiError::Internal(err) = &self {
            response
                .extensions_mut()
                .insert(InternalDetail(format!("{:?}", err)));
        }
        response.extensions_mut().insert(envelope);
        response
    }
}

// ========================================
// Conversions
// ========================================

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if lifehub_common::db::is_unique_violation(&err) {
            return ApiError::Conflict("A record with these values already exists".to_string());
        }
        if lifehub_common::db::is_foreign_key_violation(&err) {
            return ApiError::validation("Referenced record does not exist");
        }
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Record not found".to_string()),
            other => ApiError::Internal(anyhow::Error::new(other).context("database error")),
        }
    }
}

impl From<lifehub_common::Error> for ApiError {
    fn from(err: lifehub_common::Error) -> Self {
        use lifehub_common::Error as E;
        match err {
            E::Database(e) => e.into(),
            E::NotFound(what) => ApiError::NotFound(what),
            E::InvalidInput(msg) => ApiError::validation(msg),
            E::Token(e) => ApiError::Authentication(format!("Invalid token: {}", e)),
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(anyhow::Error::new(err).context("I/O error"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        match rejection {
            JsonRejection::JsonDataError(_) => ApiError::validation(message),
            JsonRejection::JsonSyntaxError(_) => ApiError::Request {
                status: StatusCode::BAD_REQUEST,
                code: "PARSE_ERROR",
                message,
            },
            JsonRejection::MissingJsonContentType(_) => ApiError::Request {
                status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
                code: "UNSUPPORTED_MEDIA_TYPE",
                message,
            },
            other => ApiError::Request {
                status: other.status(),
                code: "PARSE_ERROR",
                message,
            },
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code_mapping() {
        let cases: Vec<(ApiError, u16, &str)> = vec![
            (ApiError::validation("bad"), 400, "VALIDATION_ERROR"),
            (ApiError::Authentication("x".into()), 401, "AUTHENTICATION_ERROR"),
            (ApiError::Authorization("x".into()), 403, "AUTHORIZATION_ERROR"),
            (ApiError::not_found("Task"), 404, "NOT_FOUND"),
            (ApiError::Conflict("x".into()), 409, "CONFLICT"),
            (ApiError::RateLimited { message: "x".into(), retry_after: 3 }, 429, "RATE_LIMIT_EXCEEDED"),
            (ApiError::ServiceUnavailable("x".into()), 503, "SERVICE_UNAVAILABLE"),
            (ApiError::business("CIRCULAR_DEPENDENCY", "x"), 400, "CIRCULAR_DEPENDENCY"),
            (ApiError::ThirdParty { service: "weather".into(), message: "x".into() }, 502, "THIRD_PARTY_API_ERROR"),
            (ApiError::Internal(anyhow::anyhow!("boom")), 500, "UNKNOWN_ERROR"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_internal_message_is_generic() {
        let envelope = ApiError::Internal(anyhow::anyhow!("secret stack detail")).to_envelope();
        assert_eq!(envelope.message, "Internal server error");
        assert_eq!(envelope.details, json!({}));
    }

    #[test]
    fn test_field_error_shape() {
        let envelope = ApiError::field("email", "Enter a valid email address.").to_envelope();
        assert_eq!(envelope.details["field_errors"]["email"][0], "Enter a valid email address.");
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        assert_eq!(ApiError::from(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_response_headers() {
        let response = ApiError::RateLimited { message: "slow down".into(), retry_after: 12 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-error-code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(response.headers()["retry-after"], "12");
        assert!(response.headers().contains_key("x-error-id"));
        assert!(response.extensions().get::<ErrorEnvelope>().is_some());
    }
}
