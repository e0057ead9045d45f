//! Shared API response types
//!
//! Every error leaves the server as one [`ErrorEnvelope`]. The envelope is
//! built from an error classification and later completed with request
//! details; [`ErrorEnvelope::sanitize`] must run before it is sent.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Substrings that mark a details key as sensitive (case-insensitive)
pub const SENSITIVE_KEY_PARTS: [&str; 8] = [
    "password",
    "token",
    "secret",
    "key",
    "authorization",
    "csrf",
    "session",
    "cookie",
];

/// Replacement for redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Request context attached to an error
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub user_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
}

/// Normalized error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Correlation id (microseconds since the epoch)
    pub error_id: i64,
    /// Seconds since the epoch
    pub timestamp: f64,
    pub code: String,
    pub message: String,
    pub status_code: u16,
    pub details: Value,
    pub request_info: Option<RequestInfo>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>, status_code: u16, details: Value) -> Self {
        let now = Utc::now();
        Self {
            error_id: now.timestamp_micros(),
            timestamp: crate::time::epoch_seconds(now),
            code: code.into(),
            message: message.into(),
            status_code,
            details: if details.is_null() { Value::Object(Map::new()) } else { details },
            request_info: None,
        }
    }

    /// Redact sensitive detail keys and reduce the user agent
    pub fn sanitize(&mut self) {
        self.details = sanitize_value(std::mem::take(&mut self.details));
        if let Some(info) = self.request_info.as_mut() {
            info.user_agent = sanitize_user_agent(&info.user_agent);
        }
    }
}

/// Whether a key names sensitive data
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| lower.contains(part))
}

/// Recursively replace values under sensitive keys with [`REDACTED`]
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if is_sensitive_key(&k) {
                        (k, Value::String(REDACTED.to_string()))
                    } else {
                        (k, sanitize_value(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        other => other,
    }
}

/// Keep only the browser family of a user agent
pub fn sanitize_user_agent(user_agent: &str) -> String {
    if user_agent.contains("Mozilla") {
        "Mozilla Compatible Browser".to_string()
    } else {
        REDACTED.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_keys_redacted_recursively() {
        let details = json!({
            "Password": "hunter2",
            "nested": {"api_key": "abc", "city": "Paris"},
            "list": [{"refresh_token": "t"}, {"ok": 1}],
            "retry_after": 30
        });
        let clean = sanitize_value(details);
        assert_eq!(clean["Password"], REDACTED);
        assert_eq!(clean["nested"]["api_key"], REDACTED);
        assert_eq!(clean["nested"]["city"], "Paris");
        assert_eq!(clean["list"][0]["refresh_token"], REDACTED);
        assert_eq!(clean["list"][1]["ok"], 1);
        assert_eq!(clean["retry_after"], 30);
    }

    #[test]
    fn test_user_agent_reduced() {
        assert_eq!(
            sanitize_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0"),
            "Mozilla Compatible Browser"
        );
        assert_eq!(sanitize_user_agent("curl/8.1"), REDACTED);
        assert_eq!(sanitize_user_agent(""), REDACTED);
    }

    #[test]
    fn test_envelope_defaults_and_sanitize() {
        let mut envelope = ErrorEnvelope::new("NOT_FOUND", "missing", 404, Value::Null);
        assert!(envelope.details.is_object());
        assert!(envelope.error_id > 0);

        envelope.details = json!({"session_id": "s"});
        envelope.request_info = Some(RequestInfo {
            user_agent: "python-requests/2.31".to_string(),
            ..Default::default()
        });
        envelope.sanitize();
        assert_eq!(envelope.details["session_id"], REDACTED);
        assert_eq!(envelope.request_info.unwrap().user_agent, REDACTED);
    }
}
