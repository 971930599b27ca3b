mod common;

use common::{eventually, only_entry, spawn_app, test_config, TestApp};
use membership_points::domain::HistoryStatus;
use membership_points::resilience::CircuitBreakerConfig;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

async fn accumulate_m1(app: &TestApp) -> reqwest::Response {
    app.client
        .post(app.url("/points/accumulate"))
        .header("x-partner-type", "mart")
        .json(&json!({
            "memberId": "M1",
            "partnerId": "P1",
            "partnerType": "MART",
            "amount": 10000
        }))
        .send()
        .await
        .unwrap()
}

async fn sweep(app: &TestApp) -> Value {
    let response = app.client.post(app.url("/recovery/sweep")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    body["data"].clone()
}

async fn wait_for_failed_entry(app: &TestApp) {
    let ledger = app.ledger.clone();
    eventually(|| {
        let ledger = ledger.clone();
        async move {
            ledger
                .all()
                .into_iter()
                .find(|e| e.status == HistoryStatus::Failed)
        }
    })
    .await;
}

#[tokio::test]
async fn test_outage_is_recorded_and_retried_until_ceiling() {
    let mut config = test_config();
    config.gate.circuit_breaker = CircuitBreakerConfig {
        failure_rate_threshold: 50.0,
        sliding_window_size: 3,
        minimum_calls: 3,
        open_wait: Duration::from_secs(60),
        half_open_successes: 1,
    };
    let app = spawn_app(config).await;
    app.transactions.set_available(false);

    let response = accumulate_m1(&app).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["x-circuit-open"], "true");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "CIRCUIT_OPEN");

    let health: Value = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["circuitBreaker"], "OPEN");
    assert_eq!(health["circuitBreakerOpenedCount"], 1);

    // the event reaches ingestion, which records and replays once
    wait_for_failed_entry(&app).await;
    let entry = only_entry(&app.ledger).await;
    assert_eq!(entry.member_id, "M1");
    assert_eq!(entry.partner_type, "MART");
    assert_eq!(entry.retry_count, 1);
    assert!(entry.source_event_id.is_some());

    let report = sweep(&app).await;
    assert_eq!(report["selected"], 1);
    assert_eq!(report["failed"], 1);
    let entry = only_entry(&app.ledger).await;
    assert_eq!(entry.status, HistoryStatus::Failed);
    assert_eq!(entry.retry_count, 2);

    let report = sweep(&app).await;
    assert_eq!(report["maxRetryExceeded"], 1);
    let entry = only_entry(&app.ledger).await;
    assert_eq!(entry.status, HistoryStatus::MaxRetryExceeded);
    assert_eq!(entry.retry_count, 3);

    // terminal entries are never selected again
    let report = sweep(&app).await;
    assert_eq!(report["selected"], 0);
    assert_eq!(only_entry(&app.ledger).await, entry);

    let response = app
        .client
        .get(app.url("/recovery/history?status=MAX_RETRY_EXCEEDED"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["retryCount"], 3);
    assert!(app.transactions.all().is_empty());
}

#[tokio::test]
async fn test_outage_recovers_once_store_returns() {
    let app = spawn_app(test_config()).await;
    app.transactions.set_available(false);

    let response = accumulate_m1(&app).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["x-retry-exhausted"], "true");

    wait_for_failed_entry(&app).await;
    app.transactions.set_available(true);

    let report = sweep(&app).await;
    assert_eq!(report["completed"], 1);

    let entry = only_entry(&app.ledger).await;
    assert_eq!(entry.status, HistoryStatus::Completed);
    assert_eq!(entry.points.map(|p| p.to_string()), Some("100".to_string()));

    let rows = app.transactions.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].member_id, "M1");

    let response = app
        .client
        .get(app.url("/recovery/history?status=COMPLETED"))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_rejects_unknown_status() {
    let app = spawn_app(test_config()).await;

    let response = app
        .client
        .get(app.url("/recovery/history?status=DONE"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
