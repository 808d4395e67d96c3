//! Webhook ingestion over the HTTP surface.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use storelink_core::{BusinessId, CanonicalOrderStatus};
use storelink_integration_tests::{BUSINESS, SHOP, SHOP_SECRET, TestApp, test_config};

const ORDER_WEBHOOK: &str = "/integrations/shopify/webhook";
const ORDER_BODY: &str = r##"{
    "id": 1001,
    "name": "#1001",
    "email": "buyer@example.com",
    "financial_status": "paid",
    "fulfillment_status": null,
    "total_price": "150.00",
    "subtotal_price": "130.00",
    "total_tax": "20.00",
    "currency": "USD",
    "created_at": "2024-10-01T12:00:00Z",
    "line_items": [
        {"id": 1, "title": "Ceramic Mug", "quantity": 2, "price": "65.00", "sku": "MUG-1"}
    ]
}"##;

// ============================================================================
// Order Topics
// ============================================================================

#[tokio::test]
async fn test_order_webhook_is_acknowledged_and_published() {
    let app = TestApp::spawn().await;
    let integration = app.seed_integration(SHOP).await;

    let response = app
        .deliver_webhook(ORDER_WEBHOOK, "orders/create", SHOP, ORDER_BODY, SHOP_SECRET)
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"success": true, "message": "Recibido"}));

    let orders = app.publisher.wait_for_orders(1, Duration::from_secs(2)).await;
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.external_id, "1001");
    assert_eq!(order.integration_id, integration.id);
    assert_eq!(order.business_id, Some(BusinessId::new(BUSINESS)));
    assert_eq!(order.status, CanonicalOrderStatus::Paid);
}

#[tokio::test]
async fn test_bad_signature_is_rejected_and_not_published() {
    let app = TestApp::spawn().await;
    app.seed_integration(SHOP).await;

    let response = app
        .deliver_webhook(ORDER_WEBHOOK, "orders/create", SHOP, ORDER_BODY, "wrong-secret")
        .await;

    assert_eq!(response.status, 401);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["message"], "Firma HMAC inválida");

    let orders = app
        .publisher
        .wait_for_orders(1, Duration::from_millis(200))
        .await;
    assert!(orders.is_empty());
}

#[tokio::test]
async fn test_signature_over_modified_body_is_rejected() {
    let app = TestApp::spawn().await;
    app.seed_integration(SHOP).await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri(ORDER_WEBHOOK)
        .header("X-Shopify-Topic", "orders/create")
        .header("X-Shopify-Shop-Domain", SHOP)
        .header(
            "X-Shopify-Hmac-Sha256",
            storelink_service::webhooks::signature::sign_webhook(
                SHOP_SECRET.as_bytes(),
                ORDER_BODY.as_bytes(),
            ),
        )
        .body(axum::body::Body::from(ORDER_BODY.replace("150.00", "1.00")))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, 401);
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized() {
    let app = TestApp::spawn().await;
    app.seed_integration(SHOP).await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri(ORDER_WEBHOOK)
        .header("X-Shopify-Topic", "orders/create")
        .header("X-Shopify-Shop-Domain", SHOP)
        .body(axum::body::Body::from(ORDER_BODY))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, 401);
    assert_eq!(response.body["message"], "Firma HMAC inválida");
}

#[tokio::test]
async fn test_missing_shop_header_is_bad_request() {
    let app = TestApp::spawn().await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri(ORDER_WEBHOOK)
        .header("X-Shopify-Topic", "orders/create")
        .header("X-Shopify-Hmac-Sha256", "c2lnbmF0dXJl")
        .body(axum::body::Body::from(ORDER_BODY))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, 400);
    assert_eq!(response.body["message"], "Faltan encabezados requeridos");
}

#[tokio::test]
async fn test_unsupported_topic_is_bad_request() {
    let app = TestApp::spawn().await;
    app.seed_integration(SHOP).await;

    let response = app
        .deliver_webhook(ORDER_WEBHOOK, "products/create", SHOP, ORDER_BODY, SHOP_SECRET)
        .await;

    assert_eq!(response.status, 400);
    assert_eq!(response.body["message"], "Tópico no soportado");
}

#[tokio::test]
async fn test_compliance_topic_on_order_endpoint_is_bad_request() {
    let app = TestApp::spawn().await;
    app.seed_integration(SHOP).await;

    let response = app
        .deliver_webhook(ORDER_WEBHOOK, "shop/redact", SHOP, "{}", SHOP_SECRET)
        .await;

    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_blank_body_is_bad_request() {
    let app = TestApp::spawn().await;
    app.seed_integration(SHOP).await;

    let response = app
        .deliver_webhook(ORDER_WEBHOOK, "orders/paid", SHOP, "  \n", SHOP_SECRET)
        .await;

    assert_eq!(response.status, 400);
    assert_eq!(response.body["message"], "Cuerpo vacío");
}

#[tokio::test]
async fn test_unparseable_order_is_still_acknowledged() {
    let app = TestApp::spawn().await;
    app.seed_integration(SHOP).await;

    let response = app
        .deliver_webhook(ORDER_WEBHOOK, "orders/updated", SHOP, "not json", SHOP_SECRET)
        .await;

    // Processing happens after the acknowledgement; its failure is only logged.
    assert_eq!(response.status, 200);
    let orders = app
        .publisher
        .wait_for_orders(1, Duration::from_millis(200))
        .await;
    assert!(orders.is_empty());
}

#[tokio::test]
async fn test_fallback_secret_verifies_order_topics_only() {
    let mut config = test_config();
    config.shopify.api_secret = Some(SecretString::from("process-wide-secret"));
    let app = TestApp::spawn_with(config).await;
    let unknown_shop = "unknown-store.myshopify.com";

    let order = app
        .deliver_webhook(
            ORDER_WEBHOOK,
            "orders/create",
            unknown_shop,
            ORDER_BODY,
            "process-wide-secret",
        )
        .await;
    assert_eq!(order.status, 200);

    let compliance = app
        .deliver_webhook(
            "/integrations/shopify/webhooks/shop/redact",
            "shop/redact",
            unknown_shop,
            r#"{"shop_domain":"unknown-store.myshopify.com"}"#,
            "process-wide-secret",
        )
        .await;
    assert_eq!(compliance.status, 401);
}

// ============================================================================
// Compliance Topics
// ============================================================================

#[tokio::test]
async fn test_compliance_endpoints_acknowledge_without_publishing() {
    let app = TestApp::spawn().await;
    app.seed_integration(SHOP).await;
    let body = r#"{"shop_id":1,"shop_domain":"demo-store.myshopify.com","customer":{"id":5}}"#;

    for (uri, topic) in [
        ("/integrations/shopify/webhooks/customers/data_request", "customers/data_request"),
        ("/integrations/shopify/webhooks/customers/redact", "customers/redact"),
        ("/integrations/shopify/webhooks/shop/redact", "shop/redact"),
        ("/integrations/shopify/webhooks/compliance", "customers/redact"),
    ] {
        let response = app.deliver_webhook(uri, topic, SHOP, body, SHOP_SECRET).await;
        assert_eq!(response.status, 200, "{uri}");
        assert_eq!(response.body["success"], true);
    }

    let orders = app
        .publisher
        .wait_for_orders(1, Duration::from_millis(200))
        .await;
    assert!(orders.is_empty());
}

#[tokio::test]
async fn test_order_topic_on_compliance_endpoint_is_bad_request() {
    let app = TestApp::spawn().await;
    app.seed_integration(SHOP).await;

    let response = app
        .deliver_webhook(
            "/integrations/shopify/webhooks/compliance",
            "orders/create",
            SHOP,
            ORDER_BODY,
            SHOP_SECRET,
        )
        .await;

    assert_eq!(response.status, 400);
}
