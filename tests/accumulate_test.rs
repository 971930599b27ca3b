mod common;

use common::{spawn_app, test_config};
use membership_points::config::partners::PartnerLimits;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

#[tokio::test]
async fn test_accumulate_mart_purchase() {
    let app = spawn_app(test_config()).await;

    let response = app
        .client
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
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["memberId"], "M1");
    assert_eq!(body["partnerType"], "MART");
    assert_eq!(body["points"], "100");
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["message"], "Points accumulated successfully");

    let rows = app.transactions.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].member_id, "M1");
}

#[tokio::test]
async fn test_negative_amount_is_rejected_without_writing() {
    let app = spawn_app(test_config()).await;

    let response = app
        .client
        .post(app.url("/points/accumulate"))
        .json(&json!({
            "memberId": "M1",
            "partnerId": "P1",
            "partnerType": "MART",
            "amount": -5
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_AMOUNT");
    assert!(app.transactions.all().is_empty());
    assert_eq!(app.transactions.insert_attempts(), 0);
}

#[tokio::test]
async fn test_unknown_partner_type_is_rejected() {
    let app = spawn_app(test_config()).await;

    let response = app
        .client
        .post(app.url("/points/accumulate"))
        .json(&json!({
            "memberId": "M1",
            "partnerId": "P1",
            "partnerType": "KIOSK",
            "amount": 100
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_PARTNER_TYPE");
}

#[tokio::test]
async fn test_malformed_body_is_a_validation_error() {
    let app = spawn_app(test_config()).await;

    let response = app
        .client
        .post(app.url("/points/accumulate"))
        .header("content-type", "application/json")
        .body("{\"memberId\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_partner_rate_limit() {
    let mut config = test_config();
    config.gate.partners.partners.insert(
        "online".to_string(),
        PartnerLimits {
            rate_per_second: 1,
            burst: 2,
            max_concurrent: 10,
            max_wait: Duration::from_millis(50),
        },
    );
    let app = spawn_app(config).await;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = app
            .client
            .post(app.url("/points/accumulate"))
            .header("x-partner-type", "ONLINE")
            .json(&json!({
                "memberId": "M2",
                "partnerId": "P9",
                "partnerType": "ONLINE",
                "amount": 500
            }))
            .send()
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(statuses[..2], [StatusCode::OK, StatusCode::OK]);
    assert_eq!(statuses[2], StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.transactions.all().len(), 2);

    // other partners keep their own budget
    let response = app
        .client
        .post(app.url("/points/accumulate"))
        .header("x-partner-type", "mart")
        .json(&json!({
            "memberId": "M2",
            "partnerId": "P1",
            "partnerType": "MART",
            "amount": 500
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_transaction_history_query() {
    let app = spawn_app(test_config()).await;

    for (member, amount) in [("M1", 1000), ("M1", 2500), ("M3", 700)] {
        let response = app
            .client
            .post(app.url("/points/accumulate"))
            .json(&json!({
                "memberId": member,
                "partnerId": "P1",
                "partnerType": "CONVENIENCE",
                "amount": amount
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .client
        .get(app.url("/points/transactions/M1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "SUCCESS");
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["memberId"] == "M1"));
}

#[tokio::test]
async fn test_transaction_query_rejects_wide_window() {
    let app = spawn_app(test_config()).await;

    let response = app
        .client
        .get(app.url("/points/transactions/M1?startDate=2024-01-01&endDate=2024-06-30"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = spawn_app(test_config()).await;

    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "UP");
    assert_eq!(body["circuitBreaker"], "CLOSED");
    assert_eq!(body["circuitBreakerOpenedCount"], 0);
    assert_eq!(body["circuitBreakerRejectedCount"], 0);

    let response = app.client.get(app.url("/health/ready")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    app.transactions.set_available(false);
    let response = app.client.get(app.url("/health/ready")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
