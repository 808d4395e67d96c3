//! Liveness and readiness probes.

#![allow(clippy::unwrap_used)]

use axum::http::Method;
use storelink_integration_tests::TestApp;

#[tokio::test]
async fn test_health_is_ok_without_caller() {
    let app = TestApp::spawn().await;

    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "ok");
}

#[tokio::test]
async fn test_readiness_follows_key_value_store() {
    let app = TestApp::spawn().await;

    let ready = app.call(Method::GET, "/health/ready", None).await;
    assert_eq!(ready.status, 200);

    app.kv.set_failing(true);
    let degraded = app.call(Method::GET, "/health/ready", None).await;
    assert_eq!(degraded.status, 503);

    app.kv.set_failing(false);
    let recovered = app.call(Method::GET, "/health/ready", None).await;
    assert_eq!(recovered.status, 200);
}
