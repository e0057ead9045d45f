//! Integration tests for authentication, the error envelope and throttling

mod helpers;

use axum::http::StatusCode;
use helpers::{setup, setup_with, test_config, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_health_requires_no_token() {
    let app = setup().await;

    let response = app.send("GET", "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["module"], "lifehub-server");
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let response = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "ALICE@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["id"], alice.id.as_str());
    assert!(response.body["access"].is_string());

    let me = app.get("/api/auth/me", &alice).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["username"], "alice");
    assert!(me.body.get("password_hash").is_none());

    let profile = app.get("/api/auth/profile", &alice).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.body["language"], "zh-hans");
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let app = setup().await;
    app.register("bob").await;

    let response = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "bob@example.com", "password": "nope-nope-nope"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let app = setup().await;
    app.register("carol").await;

    let response = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": "carol2",
                "email": "carol@example.com",
                "password": PASSWORD,
                "password_confirm": PASSWORD,
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_missing_token_returns_envelope() {
    let app = setup().await;

    let response = app.send("GET", "/api/tasks/tasks", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "AUTHENTICATION_ERROR");
    assert_eq!(response.body["status_code"], 401);
    assert!(response.body["error_id"].is_string());
    assert!(response.body["timestamp"].is_string());
    assert_eq!(response.body["request_info"]["path"], "/api/tasks/tasks");
    assert_eq!(response.body["request_info"]["method"], "GET");
    // Non-browser agents are not echoed back
    assert_eq!(response.body["request_info"]["user_agent"], "[REDACTED]");
    assert_eq!(
        response.headers["x-error-id"].to_str().unwrap(),
        response.body["error_id"].as_str().unwrap()
    );
    assert_eq!(response.headers["x-error-code"], "AUTHENTICATION_ERROR");
}

#[tokio::test]
async fn test_password_field_errors_are_redacted() {
    let app = setup().await;

    let response = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": "dave",
                "email": "dave@example.com",
                "password": "short",
                "password_confirm": "short",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
    assert_eq!(response.body["details"]["field_errors"]["password"], "[REDACTED]");
}

#[tokio::test]
async fn test_framework_rejections_use_envelope() {
    let app = setup().await;
    let user = app.register("erin").await;

    let unknown = app.get("/api/does-not-exist", &user).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.body["code"], "NOT_FOUND");

    let wrong_method = app.send("DELETE", "/health", None, None).await;
    assert_eq!(wrong_method.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(wrong_method.body["code"], "METHOD_NOT_ALLOWED");

    let bad_json = app
        .send("POST", "/api/tasks/tasks", Some(&user.access), Some(json!("not an object")))
        .await;
    assert_eq!(bad_json.status, StatusCode::BAD_REQUEST);
    assert!(bad_json.body["code"].is_string());

    let bad_query = app.get("/api/tasks/tasks?status=urgent", &user).await;
    assert_eq!(bad_query.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_query.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_logout_blacklists_refresh_token() {
    let app = setup().await;
    let user = app.register("frank").await;

    let refreshed = app
        .send("POST", "/api/auth/refresh", None, Some(json!({"refresh": user.refresh})))
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);
    assert!(refreshed.body["access"].is_string());

    let logout = app.post("/api/auth/logout", &user, json!({"refresh": user.refresh})).await;
    assert_eq!(logout.status, StatusCode::OK);

    let again = app
        .send("POST", "/api/auth/refresh", None, Some(json!({"refresh": user.refresh})))
        .await;
    assert_eq!(again.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password() {
    let app = setup().await;
    let user = app.register("grace").await;

    let response = app
        .post(
            "/api/auth/change-password",
            &user,
            json!({
                "current_password": PASSWORD,
                "new_password": "another-pass-77",
                "new_password_confirm": "another-pass-77",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let login = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "grace@example.com", "password": "another-pass-77"})),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.per_minute = 2;
    let app = setup_with(config).await;

    for _ in 0..2 {
        let ok = app.send("GET", "/health", None, None).await;
        assert_eq!(ok.status, StatusCode::OK);
    }
    let limited = app.send("GET", "/health", None, None).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.body["code"], "RATE_LIMIT_EXCEEDED");
    assert!(limited.body["details"]["retry_after"].as_u64().unwrap() >= 1);
    assert!(limited.headers.contains_key("retry-after"));
}

#[tokio::test]
async fn test_rotating_forwarded_header_does_not_escape_throttle() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.per_minute = 2;
    let app = setup_with(config).await;

    let mut statuses = Vec::new();
    for i in 0..10 {
        let response = app
            .send_with_headers(
                "POST",
                "/api/auth/login",
                None,
                &[("x-forwarded-for", format!("10.0.0.{}", i))],
                Some(json!({"email": "nobody@example.com", "password": "wrong-password"})),
            )
            .await;
        statuses.push(response.status);
    }
    assert!(statuses[..2].iter().all(|s| *s != StatusCode::TOO_MANY_REQUESTS));
    assert!(statuses[2..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}
