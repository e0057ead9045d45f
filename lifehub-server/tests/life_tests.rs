//! Integration tests for habits, finance, inventory, meals, time tracking and notes

mod helpers;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use helpers::setup;
use serde_json::json;

fn today() -> chrono::NaiveDate {
    Utc::now().date_naive()
}

#[tokio::test]
async fn test_habit_check_in_builds_streak() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let habit = app.post("/api/life/habits", &alice, json!({"name": "Read"})).await;
    assert_eq!(habit.status, StatusCode::CREATED, "{}", habit.text);
    assert_eq!(habit.body["target_days"], 30);
    let id = habit.body["id"].as_str().unwrap().to_string();

    for days_ago in [2, 1, 0] {
        let date = today() - Duration::days(days_ago);
        let response = app
            .post(&format!("/api/life/habits/{}/check_in", id), &alice, json!({"date": date}))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["created"], true);
    }

    let again = app
        .post(&format!("/api/life/habits/{}/check_in", id), &alice, json!({}))
        .await;
    assert_eq!(again.body["message"], "Already checked in");
    assert_eq!(again.body["current_streak"], 3);
    assert_eq!(again.body["longest_streak"], 3);
    assert_eq!(again.body["total_days"], 3);

    // Removing the middle day breaks the current run
    let middle = today() - Duration::days(1);
    let cancelled = app
        .send(
            "DELETE",
            &format!("/api/life/habits/{}/cancel_check_in?date={}", id, middle),
            Some(&alice.access),
            None,
        )
        .await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.body["current_streak"], 1);
    assert_eq!(cancelled.body["longest_streak"], 1);

    let missing = app
        .send(
            "DELETE",
            &format!("/api/life/habits/{}/cancel_check_in?date={}", id, middle),
            Some(&alice.access),
            None,
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let stats = app.get(&format!("/api/life/habits/{}/stats", id), &alice).await;
    assert_eq!(stats.body["total_days"], 30);
    assert_eq!(stats.body["completed_days"], 2);
    assert_eq!(stats.body["this_week_records"].as_array().unwrap().len(), 7);

    let status = app.get("/api/life/habits/today_status", &alice).await;
    assert_eq!(status.body["records"][0]["habit_id"], id.as_str());
    assert_eq!(status.body["records"][0]["completed"], true);
}

#[tokio::test]
async fn test_habit_rejects_non_positive_target() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let response = app
        .post("/api/life/habits", &alice, json!({"name": "Run", "target_days": 0}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["details"]["field_errors"]["target_days"].is_array());
}

#[tokio::test]
async fn test_budget_percentage_follows_spending() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let start = today() - Duration::days(1);
    let end = today() + Duration::days(1);

    let budget = app
        .post(
            "/api/life/budgets",
            &alice,
            json!({"category": "food", "amount": 1000.0, "start_date": start, "end_date": end}),
        )
        .await;
    assert_eq!(budget.status, StatusCode::CREATED, "{}", budget.text);
    assert_eq!(budget.body["percentage_used"], 0.0);
    let budget_id = budget.body["id"].as_str().unwrap().to_string();

    let manual = app
        .patch(&format!("/api/life/budgets/{}", budget_id), &alice, json!({"spent_amount": 500.0}))
        .await;
    assert_eq!(manual.body["percentage_used"], 50.0);

    // A linked expense recomputes spending from the ledger
    let expense = app
        .post(
            "/api/life/transactions",
            &alice,
            json!({
                "amount": 250.0,
                "type": "expense",
                "category": "food",
                "description": "Groceries",
                "budget": budget_id,
            }),
        )
        .await;
    assert_eq!(expense.status, StatusCode::CREATED, "{}", expense.text);
    let transaction_id = expense.body["id"].as_str().unwrap().to_string();

    let linked = app.get(&format!("/api/life/budgets/{}", budget_id), &alice).await;
    assert_eq!(linked.body["spent_amount"], 250.0);
    assert_eq!(linked.body["percentage_used"], 25.0);

    let deleted = app
        .delete(&format!("/api/life/transactions/{}", transaction_id), &alice)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let cleared = app.get(&format!("/api/life/budgets/{}", budget_id), &alice).await;
    assert_eq!(cleared.body["spent_amount"], 0.0);

    let summary = app.get("/api/life/budgets/summary", &alice).await;
    assert_eq!(summary.body["total_budget"], 1000.0);
    assert_eq!(summary.body["category_summary"]["food"]["remaining"], 1000.0);
}

#[tokio::test]
async fn test_budget_rejects_inverted_dates_and_foreign_links() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let mallory = app.register("mallory").await;

    let inverted = app
        .post(
            "/api/life/budgets",
            &alice,
            json!({"category": "food", "amount": 10.0, "start_date": today(), "end_date": today() - Duration::days(1)}),
        )
        .await;
    assert_eq!(inverted.status, StatusCode::BAD_REQUEST);

    let budget = app
        .post(
            "/api/life/budgets",
            &alice,
            json!({"category": "food", "amount": 10.0, "start_date": today(), "end_date": today()}),
        )
        .await;
    let budget_id = budget.body["id"].as_str().unwrap();

    let foreign = app
        .post(
            "/api/life/transactions",
            &mallory,
            json!({"amount": 5.0, "type": "expense", "category": "food", "description": "x", "budget": budget_id}),
        )
        .await;
    assert_eq!(foreign.status, StatusCode::BAD_REQUEST);
    assert!(foreign.body["details"]["field_errors"]["budget"].is_array());

    let negative = app
        .post(
            "/api/life/transactions",
            &alice,
            json!({"amount": -5.0, "type": "expense", "category": "food", "description": "x"}),
        )
        .await;
    assert_eq!(negative.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transaction_summary_totals_and_trend() {
    let app = setup().await;
    let alice = app.register("alice").await;

    for (amount, kind, category) in [(3000.0, "income", "salary"), (300.0, "expense", "food"), (100.0, "expense", "transport")] {
        let response = app
            .post(
                "/api/life/transactions",
                &alice,
                json!({"amount": amount, "type": kind, "category": category, "description": category}),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    }

    let summary = app.get("/api/life/transactions/summary", &alice).await;
    assert_eq!(summary.status, StatusCode::OK);
    assert_eq!(summary.body["total_income"], 3000.0);
    assert_eq!(summary.body["total_expense"], 400.0);
    assert_eq!(summary.body["balance"], 2600.0);
    assert_eq!(summary.body["month_expense"], 400.0);

    let breakdown = summary.body["categories_breakdown"].as_array().unwrap();
    let food = breakdown.iter().find(|c| c["category"] == "food").unwrap();
    assert_eq!(food["percentage"], 75.0);

    let trend = summary.body["daily_trend"].as_array().unwrap();
    assert_eq!(trend.len(), 30);
    assert_eq!(trend[29]["income"], 3000.0);

    let expenses = app.get("/api/life/transactions?type=expense", &alice).await;
    assert_eq!(expenses.body["count"], 2);

    let bad_period = app.get("/api/life/transactions/summary?period=decade", &alice).await;
    assert_eq!(bad_period.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_items_expiring_soon_and_category_stats() {
    let app = setup().await;
    let alice = app.register("alice").await;

    for (name, days) in [("Milk", 2), ("Rice", 60), ("Yogurt", -1)] {
        let response = app
            .post(
                "/api/life/items",
                &alice,
                json!({"name": name, "category": "food", "quantity": 2, "expiry_date": today() + Duration::days(days)}),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
        assert_eq!(response.body["is_expired"], days < 0);
    }

    let soon = app.get("/api/life/items/expiring_soon", &alice).await;
    let names: Vec<&str> = soon.body.as_array().unwrap().iter().map(|i| i["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Milk"]);

    let stats = app.get("/api/life/items/category_stats", &alice).await;
    assert_eq!(stats.body["food"], 6);
}

#[tokio::test]
async fn test_meal_calories_summary() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let yesterday = today() - Duration::days(1);

    for (meal_type, calories, date) in [("breakfast", 400, today()), ("lunch", 700, today()), ("dinner", 900, yesterday)] {
        let response = app
            .post(
                "/api/life/meals",
                &alice,
                json!({"meal_type": meal_type, "description": meal_type, "calories": calories, "date": date}),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    }

    let summary = app.get("/api/life/meals/calories_summary", &alice).await;
    assert_eq!(
        summary.body,
        json!([
            {"date": yesterday, "calories": 900},
            {"date": today(), "calories": 1100},
        ])
    );

    let today_meals = app.get("/api/life/meals/today_meals", &alice).await;
    assert_eq!(today_meals.body.as_array().unwrap().len(), 2);

    let negative = app
        .post("/api/life/meals", &alice, json!({"meal_type": "snack", "description": "x", "calories": -1}))
        .await;
    assert_eq!(negative.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_time_record_duration_and_efficiency_score() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let record = app
        .post(
            "/api/time/time-records",
            &alice,
            json!({
                "description": "Deep work",
                "start_time": "2024-03-01T09:00:00Z",
                "end_time": "2024-03-01T10:30:00Z",
            }),
        )
        .await;
    assert_eq!(record.status, StatusCode::CREATED, "{}", record.text);
    assert_eq!(record.body["duration_minutes"], 90);
    let id = record.body["id"].as_str().unwrap().to_string();

    let reopened = app
        .patch(&format!("/api/time/time-records/{}", id), &alice, json!({"end_time": null}))
        .await;
    assert_eq!(reopened.status, StatusCode::OK);
    assert!(reopened.body["duration_minutes"].is_null());

    let backwards = app
        .patch(
            &format!("/api/time/time-records/{}", id),
            &alice,
            json!({"end_time": "2024-03-01T08:00:00Z"}),
        )
        .await;
    assert_eq!(backwards.status, StatusCode::BAD_REQUEST);

    let efficiency = app
        .post(
            "/api/time/efficiency",
            &alice,
            json!({"date": "2024-03-01", "focus_hours": 4.0, "tasks_completed": 3, "tasks_planned": 4}),
        )
        .await;
    assert_eq!(efficiency.status, StatusCode::CREATED, "{}", efficiency.text);
    assert_eq!(efficiency.body["efficiency_score"], 62.5);
    let efficiency_id = efficiency.body["id"].as_str().unwrap().to_string();

    // Without planned tasks the previous score is kept
    let unplanned = app
        .patch(
            &format!("/api/time/efficiency/{}", efficiency_id),
            &alice,
            json!({"tasks_planned": 0}),
        )
        .await;
    assert_eq!(unplanned.body["efficiency_score"], 62.5);
}

#[tokio::test]
async fn test_note_versions_and_links() {
    let app = setup().await;
    let alice = app.register("alice").await;

    let first = app
        .post("/api/knowledge/notes", &alice, json!({"title": "Rust", "content": "ownership"}))
        .await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.text);
    let first_id = first.body["id"].as_str().unwrap().to_string();
    let second = app
        .post("/api/knowledge/notes", &alice, json!({"title": "Borrowing", "format_type": "markdown"}))
        .await;
    let second_id = second.body["id"].as_str().unwrap().to_string();

    app.patch(&format!("/api/knowledge/notes/{}", first_id), &alice, json!({"content": "ownership and moves"}))
        .await;
    app.patch(&format!("/api/knowledge/notes/{}", first_id), &alice, json!({"title": "Rust basics"}))
        .await;
    // Unchanged text does not add a version
    app.patch(&format!("/api/knowledge/notes/{}", first_id), &alice, json!({"format_type": "markdown"}))
        .await;

    let versions = app.get(&format!("/api/knowledge/notes/{}/versions", first_id), &alice).await;
    let versions = versions.body.as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["version_number"], 2);
    assert_eq!(versions[0]["content"], "ownership and moves");
    assert_eq!(versions[1]["title"], "Rust");

    let link = app
        .post(
            &format!("/api/knowledge/notes/{}/add_link", first_id),
            &alice,
            json!({"to_note_id": second_id}),
        )
        .await;
    assert_eq!(link.status, StatusCode::CREATED);

    let outgoing = app.get(&format!("/api/knowledge/notes/{}/links", first_id), &alice).await;
    assert_eq!(outgoing.body["outgoing"][0]["to_note_title"], "Borrowing");
    let incoming = app.get(&format!("/api/knowledge/notes/{}/links", second_id), &alice).await;
    assert_eq!(incoming.body["incoming"][0]["from_note_title"], "Rust basics");

    let self_link = app
        .post(
            &format!("/api/knowledge/notes/{}/add_link", first_id),
            &alice,
            json!({"to_note_id": first_id}),
        )
        .await;
    assert_eq!(self_link.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_package_tracking_advances_to_delivered() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let mallory = app.register("mallory").await;

    let couriers = app.get("/api/life/packages/search_courier?query=sf", &alice).await;
    assert_eq!(couriers.status, StatusCode::OK);
    assert_eq!(couriers.body, json!(["SF Express"]));
    let all = app.get("/api/life/packages/search_courier", &alice).await;
    assert_eq!(all.body.as_array().unwrap().len(), 5);

    let package = app
        .post(
            "/api/life/packages",
            &alice,
            json!({"tracking_number": "SF1234567890", "courier": "SF Express", "description": "Books"}),
        )
        .await;
    assert_eq!(package.status, StatusCode::CREATED, "{}", package.text);
    assert_eq!(package.body["current_status"], "pending");
    assert_eq!(package.body["is_delivered"], false);
    let id = package.body["id"].as_str().unwrap().to_string();

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let refreshed = app
            .post(&format!("/api/life/packages/{}/refresh_tracking", id), &alice, json!({}))
            .await;
        assert_eq!(refreshed.status, StatusCode::OK);
        statuses.push(refreshed.body["current_status"].as_str().unwrap().to_string());
    }
    assert_eq!(statuses, vec!["in_transit", "out_for_delivery", "delivered", "delivered"]);

    let detail = app.get(&format!("/api/life/packages/{}", id), &alice).await;
    assert_eq!(detail.body["is_delivered"], true);
    assert!(detail.body["last_update"].is_string());

    let tracking = app.get(&format!("/api/life/packages/{}/tracking", id), &alice).await;
    assert_eq!(tracking.status, StatusCode::OK);
    assert_eq!(tracking.body["current_status"], "delivered");
    assert_eq!(tracking.body["current_location"], "Signed for");
    let steps = tracking.body["tracking_info"].as_array().unwrap();
    assert_eq!(steps.len(), 4);
    assert_eq!(steps[0]["description"], "Picked up by SF Express");

    let delivered = app.get("/api/life/packages?current_status=delivered", &alice).await;
    assert_eq!(delivered.body["count"], 1);
    let pending = app.get("/api/life/packages?current_status=pending", &alice).await;
    assert_eq!(pending.body["count"], 0);

    let snooping = app.get(&format!("/api/life/packages/{}/tracking", id), &mallory).await;
    assert_eq!(snooping.status, StatusCode::NOT_FOUND);
    let foreign_refresh = app
        .post(&format!("/api/life/packages/{}/refresh_tracking", id), &mallory, json!({}))
        .await;
    assert_eq!(foreign_refresh.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_budgets_are_private() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let mallory = app.register("mallory").await;

    let budget = app
        .post(
            "/api/life/budgets",
            &alice,
            json!({"category": "food", "amount": 300.0, "start_date": today(), "end_date": today()}),
        )
        .await;
    assert_eq!(budget.status, StatusCode::CREATED, "{}", budget.text);
    let id = budget.body["id"].as_str().unwrap().to_string();

    let read = app.get(&format!("/api/life/budgets/{}", id), &mallory).await;
    assert_eq!(read.status, StatusCode::NOT_FOUND);
    assert_eq!(read.body["code"], "NOT_FOUND");
    let write = app
        .patch(&format!("/api/life/budgets/{}", id), &mallory, json!({"amount": 1.0}))
        .await;
    assert_eq!(write.status, StatusCode::NOT_FOUND);
    let delete = app.delete(&format!("/api/life/budgets/{}", id), &mallory).await;
    assert_eq!(delete.status, StatusCode::NOT_FOUND);

    let listed = app.get("/api/life/budgets", &mallory).await;
    assert_eq!(listed.body["count"], 0);
    let kept = app.get(&format!("/api/life/budgets/{}", id), &alice).await;
    assert_eq!(kept.body["amount"], 300.0);
}
