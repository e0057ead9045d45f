//! Integration tests for calendars, events and pomodoro sessions

mod helpers;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use helpers::{setup, TestApp, TestUser};
use serde_json::{json, Value};

async fn create_calendar(app: &TestApp, user: &TestUser, body: Value) -> String {
    let response = app.post("/api/time/calendars", user, body).await;
    assert_eq!(response.status, StatusCode::CREATED, "create calendar failed: {}", response.text);
    response.body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_only_one_default_calendar() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let work = create_calendar(&app, &alice, json!({"name": "Work", "is_default": true})).await;
    let home = create_calendar(&app, &alice, json!({"name": "Home", "is_default": true})).await;

    let defaults = app.get("/api/time/calendars?is_default=true", &alice).await;
    assert_eq!(defaults.body["count"], 1);
    assert_eq!(defaults.body["results"][0]["id"], home.as_str());

    let switched = app
        .patch(&format!("/api/time/calendars/{}", work), &alice, json!({"is_default": true}))
        .await;
    assert_eq!(switched.status, StatusCode::OK);
    assert_eq!(switched.body["is_default"], true);
    let home_now = app.get(&format!("/api/time/calendars/{}", home), &alice).await;
    assert_eq!(home_now.body["is_default"], false);

    // Defaults are per user
    let bob = app.register("bob").await;
    create_calendar(&app, &bob, json!({"name": "Bob's", "is_default": true})).await;
    let alice_default = app.get(&format!("/api/time/calendars/{}", work), &alice).await;
    assert_eq!(alice_default.body["is_default"], true);
}

#[tokio::test]
async fn test_calendar_defaults_and_validation() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let created = app.post("/api/time/calendars", &alice, json!({"name": "Personal"})).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["color"], "#1890ff");
    assert_eq!(created.body["is_default"], false);
    assert_eq!(created.body["creator"], alice.id.as_str());

    let bad_color = app
        .post("/api/time/calendars", &alice, json!({"name": "Odd", "color": "blue"}))
        .await;
    assert_eq!(bad_color.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_event_crud_and_time_order() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let calendar = create_calendar(&app, &alice, json!({"name": "Work"})).await;
    let start = Utc::now();

    let backwards = app
        .post(
            "/api/time/events",
            &alice,
            json!({
                "title": "Standup",
                "calendar": calendar,
                "start_time": start,
                "end_time": start - Duration::minutes(15),
            }),
        )
        .await;
    assert_eq!(backwards.status, StatusCode::BAD_REQUEST);
    assert!(backwards.body["details"]["field_errors"]["end_time"].is_string());

    let created = app
        .post(
            "/api/time/events",
            &alice,
            json!({
                "title": "Standup",
                "calendar": calendar,
                "start_time": start,
                "end_time": start + Duration::minutes(15),
                "location": "Room 4",
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.text);
    assert_eq!(created.body["event_type"], "work");
    assert_eq!(created.body["reminder_minutes"], 15);
    assert_eq!(created.body["calendar_name"], "Work");
    let id = created.body["id"].as_str().unwrap().to_string();

    // Zero-length events are allowed
    let instant = app
        .patch(&format!("/api/time/events/{}", id), &alice, json!({"end_time": start}))
        .await;
    assert_eq!(instant.status, StatusCode::OK, "{}", instant.text);

    let reversed = app
        .patch(
            &format!("/api/time/events/{}", id),
            &alice,
            json!({"start_time": start + Duration::hours(1)}),
        )
        .await;
    assert_eq!(reversed.status, StatusCode::BAD_REQUEST);

    let retyped = app
        .patch(&format!("/api/time/events/{}", id), &alice, json!({"event_type": "health"}))
        .await;
    assert_eq!(retyped.body["event_type"], "health");
    let health = app.get("/api/time/events?event_type=health", &alice).await;
    assert_eq!(health.body["count"], 1);
    let life = app.get("/api/time/events?event_type=life", &alice).await;
    assert_eq!(life.body["count"], 0);

    let deleted = app.delete(&format!("/api/time/events/{}", id), &alice).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let gone = app.get(&format!("/api/time/events/{}", id), &alice).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_today_events() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let calendar = create_calendar(&app, &alice, json!({"name": "Life"})).await;
    let now = Utc::now();

    for (title, start) in [("Now", now), ("Next week", now + Duration::days(7))] {
        let response = app
            .post(
                "/api/time/events",
                &alice,
                json!({
                    "title": title,
                    "calendar": calendar,
                    "start_time": start,
                    "end_time": start,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let today = app.get("/api/time/events/today", &alice).await;
    assert_eq!(today.status, StatusCode::OK);
    let titles: Vec<&str> = today.body.as_array().unwrap().iter().map(|e| e["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Now"]);
}

#[tokio::test]
async fn test_calendars_and_events_are_private() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let mallory = app.register("mallory").await;
    let calendar = create_calendar(&app, &alice, json!({"name": "Private"})).await;
    let now = Utc::now();
    let event = app
        .post(
            "/api/time/events",
            &alice,
            json!({"title": "Secret", "calendar": calendar, "start_time": now, "end_time": now}),
        )
        .await;
    let event_id = event.body["id"].as_str().unwrap().to_string();

    let calendar_read = app.get(&format!("/api/time/calendars/{}", calendar), &mallory).await;
    assert_eq!(calendar_read.status, StatusCode::NOT_FOUND);
    let event_read = app.get(&format!("/api/time/events/{}", event_id), &mallory).await;
    assert_eq!(event_read.status, StatusCode::NOT_FOUND);
    assert_eq!(event_read.body["code"], "NOT_FOUND");
    let event_delete = app.delete(&format!("/api/time/events/{}", event_id), &mallory).await;
    assert_eq!(event_delete.status, StatusCode::NOT_FOUND);

    // Another user's calendar cannot hold a new event
    let borrowed = app
        .post(
            "/api/time/events",
            &mallory,
            json!({"title": "Sneaky", "calendar": calendar, "start_time": now, "end_time": now}),
        )
        .await;
    assert_eq!(borrowed.status, StatusCode::BAD_REQUEST);
    assert!(borrowed.body["details"]["field_errors"]["calendar"].is_string());

    let listed = app.get("/api/time/events", &mallory).await;
    assert_eq!(listed.body["count"], 0);
}

#[tokio::test]
async fn test_pomodoro_sessions() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let mallory = app.register("mallory").await;

    let created = app.post("/api/time/pomodoro", &alice, json!({})).await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.text);
    assert_eq!(created.body["work_duration"], 25);
    assert_eq!(created.body["break_duration"], 5);
    assert_eq!(created.body["long_break_duration"], 15);
    assert_eq!(created.body["current_session_type"], "work");
    assert_eq!(created.body["is_active"], true);
    let id = created.body["id"].as_str().unwrap().to_string();

    let progressed = app
        .patch(
            &format!("/api/time/pomodoro/{}", id),
            &alice,
            json!({"sessions_completed": 4, "current_session_type": "long_break"}),
        )
        .await;
    assert_eq!(progressed.status, StatusCode::OK);
    assert_eq!(progressed.body["sessions_completed"], 4);
    assert_eq!(progressed.body["current_session_type"], "long_break");

    let zero = app.post("/api/time/pomodoro", &alice, json!({"work_duration": 0})).await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
    assert!(zero.body["details"]["field_errors"]["work_duration"].is_string());

    let foreign_task = app.post("/api/time/pomodoro", &alice, json!({"task": "no-such-task"})).await;
    assert_eq!(foreign_task.status, StatusCode::BAD_REQUEST);

    let snooping = app.get(&format!("/api/time/pomodoro/{}", id), &mallory).await;
    assert_eq!(snooping.status, StatusCode::NOT_FOUND);
    let listed = app.get("/api/time/pomodoro", &mallory).await;
    assert_eq!(listed.body["count"], 0);

    let deleted = app.delete(&format!("/api/time/pomodoro/{}", id), &alice).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
}
