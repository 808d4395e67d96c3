//! Notification-config use cases over the HTTP surface.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::Method;
use serde_json::{Value, json};
use storelink_integration_tests::{BUSINESS, SHOP, TestApp};

// Seeded catalog: whatsapp = 1 (events 1-4), email = 2 (events 5-8),
// sms = 3 (events 9-12); order.created is the first event of each channel.
// Order statuses: pending = 1, paid = 2.
const WHATSAPP: i64 = 1;
const EMAIL: i64 = 2;
const SMS: i64 = 3;
const WHATSAPP_ORDER_CREATED: i64 = 1;
const WHATSAPP_ORDER_PAID: i64 = 2;
const EMAIL_ORDER_CREATED: i64 = 5;
const SMS_ORDER_CREATED: i64 = 9;
const STATUS_PAID: i64 = 2;

async fn create_rule(app: &TestApp, integration: i64, kind: i64, event: i64) -> Value {
    let response = app
        .call(
            Method::POST,
            "/notification-configs",
            Some(json!({
                "integration_id": integration,
                "notification_type_id": kind,
                "event_type_id": event,
                "description": "notify",
            })),
        )
        .await;
    assert_eq!(response.status, 201, "{:?}", response.body);
    response.body
}

// ============================================================================
// CRUD
// ============================================================================

#[tokio::test]
async fn test_create_and_read_rule() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;

    let created = create_rule(&app, integration.id.as_i64(), WHATSAPP, WHATSAPP_ORDER_CREATED).await;
    assert_eq!(created["business_id"], BUSINESS);
    assert_eq!(created["enabled"], true);

    let id = created["id"].as_i64().unwrap();
    let fetched = app
        .call(Method::GET, &format!("/notification-configs/{id}"), None)
        .await;
    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.body["event_type_id"], WHATSAPP_ORDER_CREATED);

    let listed = app
        .call(
            Method::GET,
            &format!("/notification-configs?integration_id={}", integration.id),
            None,
        )
        .await;
    assert_eq!(listed.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_rule_is_conflict() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;
    create_rule(&app, integration.id.as_i64(), WHATSAPP, WHATSAPP_ORDER_CREATED).await;

    let response = app
        .call(
            Method::POST,
            "/notification-configs",
            Some(json!({
                "integration_id": integration.id,
                "notification_type_id": WHATSAPP,
                "event_type_id": WHATSAPP_ORDER_CREATED,
                "enabled": false,
            })),
        )
        .await;

    assert_eq!(response.status, 409);
    assert_eq!(
        response.body["error"],
        "A similar notification config already exists"
    );

    let listed = app.call(Method::GET, "/notification-configs", None).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_event_type_is_bad_request() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;

    let response = app
        .call(
            Method::POST,
            "/notification-configs",
            Some(json!({
                "integration_id": integration.id,
                "notification_type_id": WHATSAPP,
                "event_type_id": 999,
            })),
        )
        .await;

    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_rules_of_other_businesses_are_hidden() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;
    let created = create_rule(&app, integration.id.as_i64(), WHATSAPP, WHATSAPP_ORDER_CREATED).await;
    let id = created["id"].as_i64().unwrap();

    let other = BUSINESS + 1;
    let fetched = app
        .call_as(other, Method::GET, &format!("/notification-configs/{id}"), None)
        .await;
    assert_eq!(fetched.status, 404);

    let deleted = app
        .call_as(other, Method::DELETE, &format!("/notification-configs/{id}"), None)
        .await;
    assert_eq!(deleted.status, 404);

    let create_on_foreign = app
        .call_as(
            other,
            Method::POST,
            "/notification-configs",
            Some(json!({
                "integration_id": integration.id,
                "notification_type_id": EMAIL,
                "event_type_id": EMAIL_ORDER_CREATED,
            })),
        )
        .await;
    assert_eq!(create_on_foreign.status, 404);
}

#[tokio::test]
async fn test_patch_moves_rule_between_cache_keys() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;
    let created = create_rule(&app, integration.id.as_i64(), WHATSAPP, WHATSAPP_ORDER_CREATED).await;
    let id = created["id"].as_i64().unwrap();

    let patched = app
        .call(
            Method::PATCH,
            &format!("/notification-configs/{id}"),
            Some(json!({"event_type_id": WHATSAPP_ORDER_PAID, "description": "paid"})),
        )
        .await;
    assert_eq!(patched.status, 200);
    assert_eq!(patched.body["event_type_id"], WHATSAPP_ORDER_PAID);
    assert_eq!(patched.body["description"], "paid");

    let old = app
        .call(
            Method::GET,
            &format!(
                "/notification-configs/lookup?integration_id={}&event_code=order.created",
                integration.id
            ),
            None,
        )
        .await;
    assert_eq!(old.body, json!([]));

    let new = app
        .call(
            Method::GET,
            &format!(
                "/notification-configs/lookup?integration_id={}&notification_type_id={WHATSAPP}&event_type_id={WHATSAPP_ORDER_PAID}",
                integration.id
            ),
            None,
        )
        .await;
    assert_eq!(new.status, 200);
    assert_eq!(new.body[0]["id"], id);
    assert_eq!(new.body[0]["event_code"], "order.paid");
}

#[tokio::test]
async fn test_delete_purges_cache() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;
    let created = create_rule(&app, integration.id.as_i64(), SMS, SMS_ORDER_CREATED).await;
    let id = created["id"].as_i64().unwrap();
    assert!(!app.kv.keys().await.is_empty());

    let deleted = app
        .call(Method::DELETE, &format!("/notification-configs/{id}"), None)
        .await;
    assert_eq!(deleted.status, 204);
    assert!(app.kv.keys().await.is_empty());

    let fetched = app
        .call(Method::GET, &format!("/notification-configs/{id}"), None)
        .await;
    assert_eq!(fetched.status, 404);
}

#[tokio::test]
async fn test_evaluate_conditions() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;
    let created = app
        .call(
            Method::POST,
            "/notification-configs",
            Some(json!({
                "integration_id": integration.id,
                "notification_type_id": WHATSAPP,
                "event_type_id": WHATSAPP_ORDER_PAID,
                "order_status_ids": [STATUS_PAID],
                "payment_methods": ["COD"],
            })),
        )
        .await;
    let id = created.body["id"].as_i64().unwrap();
    let uri = format!("/notification-configs/{id}/evaluate");

    let hit = app
        .call(
            Method::POST,
            &uri,
            Some(json!({"order_status_id": STATUS_PAID, "payment_method": "cod"})),
        )
        .await;
    assert_eq!(hit.body, json!({"matches": true}));

    let wrong_method = app
        .call(
            Method::POST,
            &uri,
            Some(json!({"order_status_id": STATUS_PAID, "payment_method": "card"})),
        )
        .await;
    assert_eq!(wrong_method.body, json!({"matches": false}));

    let no_status = app
        .call(Method::POST, &uri, Some(json!({"payment_method": "cod"})))
        .await;
    assert_eq!(no_status.body, json!({"matches": false}));
}

#[tokio::test]
async fn test_lookup_requires_a_trigger() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;

    let response = app
        .call(
            Method::GET,
            &format!("/notification-configs/lookup?integration_id={}", integration.id),
            None,
        )
        .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_missing_caller_is_unauthorized() {
    let app = TestApp::spawn().await;

    let request = axum::http::Request::builder()
        .uri("/notification-configs")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, 401);
    assert_eq!(response.body["error"], "Authentication required");
}

// ============================================================================
// Batch Sync
// ============================================================================

#[tokio::test]
async fn test_sync_creates_updates_and_deletes() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;
    let integration_id = integration.id.as_i64();

    let kept = create_rule(&app, integration_id, WHATSAPP, WHATSAPP_ORDER_CREATED).await;
    let dropped = create_rule(&app, integration_id, EMAIL, EMAIL_ORDER_CREATED).await;
    let kept_id = kept["id"].as_i64().unwrap();
    let dropped_id = dropped["id"].as_i64().unwrap();

    let response = app
        .call(
            Method::PUT,
            "/notification-configs/sync",
            Some(json!({
                "integration_id": integration_id,
                "rules": [
                    {
                        "id": kept_id,
                        "notification_type_id": WHATSAPP,
                        "event_type_id": WHATSAPP_ORDER_CREATED,
                        "description": "updated",
                    },
                    {
                        "notification_type_id": SMS,
                        "event_type_id": SMS_ORDER_CREATED,
                    },
                ],
            })),
        )
        .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body, json!({"created": 1, "updated": 1, "deleted": 1}));

    let listed = app
        .call(
            Method::GET,
            &format!("/notification-configs?integration_id={integration_id}"),
            None,
        )
        .await;
    let rules = listed.body.as_array().unwrap();
    assert_eq!(rules.len(), 2);
    assert!(rules.iter().all(|r| r["id"] != dropped_id));
    let updated = rules.iter().find(|r| r["id"] == kept_id).unwrap();
    assert_eq!(updated["description"], "updated");

    let cached = app
        .call(
            Method::GET,
            &format!(
                "/notification-configs/lookup?integration_id={integration_id}&event_code=order.created"
            ),
            None,
        )
        .await;
    let mut types: Vec<i64> = cached
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["notification_type_id"].as_i64().unwrap())
        .collect();
    types.sort_unstable();
    assert_eq!(types, vec![WHATSAPP, SMS]);
}

#[tokio::test]
async fn test_sync_with_duplicate_triggers_changes_nothing() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;
    let integration_id = integration.id.as_i64();
    create_rule(&app, integration_id, EMAIL, EMAIL_ORDER_CREATED).await;

    let response = app
        .call(
            Method::PUT,
            "/notification-configs/sync",
            Some(json!({
                "integration_id": integration_id,
                "rules": [
                    {"notification_type_id": SMS, "event_type_id": SMS_ORDER_CREATED},
                    {"notification_type_id": SMS, "event_type_id": SMS_ORDER_CREATED},
                ],
            })),
        )
        .await;
    assert_eq!(response.status, 409);

    let listed = app.call(Method::GET, "/notification-configs", None).await;
    let rules = listed.body.as_array().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["notification_type_id"], EMAIL);
}

#[tokio::test]
async fn test_sync_rejects_ids_of_other_integrations() {
    let app = TestApp::spawn().await;
    let first = app.seed_integration(SHOP).await;
    let second = app.seed_integration("second-store.myshopify.com").await;
    let foreign = create_rule(&app, first.id.as_i64(), EMAIL, EMAIL_ORDER_CREATED).await;

    let response = app
        .call(
            Method::PUT,
            "/notification-configs/sync",
            Some(json!({
                "integration_id": second.id,
                "rules": [{
                    "id": foreign["id"],
                    "notification_type_id": EMAIL,
                    "event_type_id": EMAIL_ORDER_CREATED,
                }],
            })),
        )
        .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_sync_with_empty_batch_clears_the_pair() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;
    let integration_id = integration.id.as_i64();
    create_rule(&app, integration_id, EMAIL, EMAIL_ORDER_CREATED).await;
    create_rule(&app, integration_id, SMS, SMS_ORDER_CREATED).await;

    let response = app
        .call(
            Method::PUT,
            "/notification-configs/sync",
            Some(json!({"integration_id": integration_id, "rules": []})),
        )
        .await;
    assert_eq!(response.body, json!({"created": 0, "updated": 0, "deleted": 2}));
    assert!(app.kv.keys().await.is_empty());
}
