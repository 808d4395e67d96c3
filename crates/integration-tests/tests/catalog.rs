//! Notification catalog routes.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::Method;
use serde_json::json;
use storelink_integration_tests::{SHOP, TestApp};

#[tokio::test]
async fn test_list_catalog() {
    let app = TestApp::spawn().await;

    let types = app.call(Method::GET, "/notification-types", None).await;
    assert_eq!(types.status, 200);
    let codes: Vec<&str> = types
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["whatsapp", "email", "sms", "sse"]);

    let events = app
        .call(Method::GET, "/notification-event-types?notification_type_id=2", None)
        .await;
    let events = events.body.as_array().unwrap();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e["notification_type_id"] == 2));

    let statuses = app.call(Method::GET, "/order-statuses", None).await;
    assert!(
        statuses
            .body
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s["code"] == "paid")
    );
}

#[tokio::test]
async fn test_create_event_type() {
    let app = TestApp::spawn().await;

    let created = app
        .call(
            Method::POST,
            "/notification-event-types",
            Some(json!({
                "notification_type_id": 4,
                "event_code": "order.refunded",
                "name": "Order refunded",
            })),
        )
        .await;
    assert_eq!(created.status, 201, "{:?}", created.body);
    assert_eq!(created.body["event_code"], "order.refunded");

    let duplicate = app
        .call(
            Method::POST,
            "/notification-event-types",
            Some(json!({
                "notification_type_id": 4,
                "event_code": "order.refunded",
                "name": "Again",
            })),
        )
        .await;
    assert_eq!(duplicate.status, 409);

    let blank = app
        .call(
            Method::POST,
            "/notification-event-types",
            Some(json!({"notification_type_id": 4, "event_code": " ", "name": "Blank"})),
        )
        .await;
    assert_eq!(blank.status, 400);

    let unknown_channel = app
        .call(
            Method::POST,
            "/notification-event-types",
            Some(json!({"notification_type_id": 99, "event_code": "x", "name": "X"})),
        )
        .await;
    assert_eq!(unknown_channel.status, 400);
}

#[tokio::test]
async fn test_event_type_in_use_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;

    let rule = app
        .call(
            Method::POST,
            "/notification-configs",
            Some(json!({
                "integration_id": integration.id,
                "notification_type_id": 1,
                "event_type_id": 3,
            })),
        )
        .await;
    let rule_id = rule.body["id"].as_i64().unwrap();

    let refused = app
        .call(Method::DELETE, "/notification-event-types/3", None)
        .await;
    assert_eq!(refused.status, 409);
    assert_eq!(
        refused.body["error"],
        "cannot delete event type: 1 active notification config(s) still use it"
    );

    // A disabled rule no longer blocks the deletion and goes with it.
    let disabled = app
        .call(
            Method::PATCH,
            &format!("/notification-configs/{rule_id}"),
            Some(json!({"enabled": false})),
        )
        .await;
    assert_eq!(disabled.status, 200);

    let deleted = app
        .call(Method::DELETE, "/notification-event-types/3", None)
        .await;
    assert_eq!(deleted.status, 204);

    let gone = app
        .call(Method::GET, &format!("/notification-configs/{rule_id}"), None)
        .await;
    assert_eq!(gone.status, 404);
    assert!(app.kv.keys().await.is_empty());
}

#[tokio::test]
async fn test_delete_unknown_event_type_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .call(Method::DELETE, "/notification-event-types/999", None)
        .await;
    assert_eq!(response.status, 404);
}
