//! Integration test harness for Storelink.
//!
//! Builds the real router over in-memory adapters and points the storefront
//! client at a `wiremock` server, so no `PostgreSQL`, Redis or `RabbitMQ` is
//! needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p storelink-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::Value;
use storelink_core::{BusinessId, Integration, IntegrationConfig, INTEGRATION_TYPE_SHOPIFY};
use storelink_service::config::{
    DEFAULT_AMQP_EXCHANGE, DEFAULT_SHOPIFY_SCOPES, ServiceConfig, ShopifyAppConfig,
};
use storelink_service::middleware::{HEADER_BUSINESS_ID, HEADER_USER_ID};
use storelink_service::notifications::{MemoryKvStore, MemoryNotificationRepository};
use storelink_service::publisher::MemoryPublisher;
use storelink_service::registry::{
    ACCESS_TOKEN_FIELD, CLIENT_ID_FIELD, CLIENT_SECRET_FIELD, MemoryIntegrationStore,
    NewIntegration,
};
use storelink_service::shopify::ShopifyRestClient;
use storelink_service::state::{AppState, Backends};
use storelink_service::webhooks::signature::sign_webhook;
use tower::ServiceExt;
use wiremock::MockServer;

/// Shop used by most tests.
pub const SHOP: &str = "demo-store.myshopify.com";

/// Business the default caller belongs to.
pub const BUSINESS: i64 = 7;

/// Default caller.
pub const USER: i64 = 11;

/// Per-shop secret that signs webhooks of seeded integrations.
pub const SHOP_SECRET: &str = "shop-webhook-secret";

/// Default app credentials.
pub const APP_CLIENT_ID: &str = "app-client-id";
pub const APP_CLIENT_SECRET: &str = "app-client-secret";

/// Access token of seeded integrations.
pub const ACCESS_TOKEN: &str = "shpat_test_token";

/// Configuration for tests.
#[must_use]
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        database_url: SecretString::from("postgres://localhost/storelink_test"),
        redis_url: SecretString::from("redis://localhost:6379"),
        amqp_url: None,
        amqp_exchange: DEFAULT_AMQP_EXCHANGE.to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 8080,
        route_prefix: String::new(),
        frontend_url: "http://localhost:3000".to_string(),
        credentials_key: SecretString::from("k".repeat(32)),
        shopify: ShopifyAppConfig {
            client_id: Some(APP_CLIENT_ID.to_string()),
            client_secret: Some(SecretString::from(APP_CLIENT_SECRET)),
            redirect_uri: None,
            scopes: DEFAULT_SHOPIFY_SCOPES.to_string(),
            api_secret: None,
            debug: false,
        },
        webhook_base_url: None,
        app_env: "development".to_string(),
        log_json: false,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// A running application over in-memory adapters.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub storefront: MockServer,
    pub kv: Arc<MemoryKvStore>,
    pub publisher: Arc<MemoryPublisher>,
    pub repository: Arc<MemoryNotificationRepository>,
}

impl TestApp {
    /// Start with the default test configuration.
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    /// Start with a custom configuration.
    pub async fn spawn_with(config: ServiceConfig) -> Self {
        Self::spawn_with_kv(config, Arc::new(MemoryKvStore::new())).await
    }

    /// Start over a prepared key-value store.
    pub async fn spawn_with_kv(config: ServiceConfig, kv: Arc<MemoryKvStore>) -> Self {
        let storefront = MockServer::start().await;
        let client = ShopifyRestClient::with_base_url(&storefront.uri(), false).unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let repository = Arc::new(MemoryNotificationRepository::new());

        let mut backends = Backends::new(
            Arc::new(MemoryIntegrationStore::new()),
            repository.clone(),
            kv.clone(),
            publisher.clone(),
            publisher.clone(),
            client,
        );
        backends.sync_page_delay = Duration::ZERO;

        let state = AppState::new(config, backends).await;
        let router = storelink_service::build_router(state.clone());

        Self {
            router,
            state,
            storefront,
            kv,
            publisher,
            repository,
        }
    }

    /// Persist a storefront integration for [`BUSINESS`] signed with
    /// [`SHOP_SECRET`].
    pub async fn seed_integration(&self, shop: &str) -> Integration {
        self.seed_integration_for(shop, BusinessId::new(BUSINESS)).await
    }

    pub async fn seed_integration_for(&self, shop: &str, business: BusinessId) -> Integration {
        self.state
            .registry()
            .create(NewIntegration {
                business_id: Some(business),
                name: format!("Store {shop}"),
                code: None,
                integration_type: INTEGRATION_TYPE_SHOPIFY.to_string(),
                external_id: shop.to_string(),
                config: IntegrationConfig {
                    store_name: Some(shop.to_string()),
                    store_url: Some(format!("https://{shop}")),
                    ..IntegrationConfig::default()
                },
                credentials: vec![
                    (ACCESS_TOKEN_FIELD.to_string(), SecretString::from(ACCESS_TOKEN)),
                    (CLIENT_ID_FIELD.to_string(), SecretString::from(APP_CLIENT_ID)),
                    (CLIENT_SECRET_FIELD.to_string(), SecretString::from(SHOP_SECRET)),
                ],
            })
            .await
            .unwrap()
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Send a JSON request as the default caller.
    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        self.call_as(BUSINESS, method, uri, body).await
    }

    /// Send a JSON request as a caller of `business`.
    pub async fn call_as(
        &self,
        business: i64,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> TestResponse {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(HEADER_USER_ID, USER.to_string())
            .header(HEADER_BUSINESS_ID, business.to_string());
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    /// Deliver a webhook signed with `secret`.
    pub async fn deliver_webhook(
        &self,
        uri: &str,
        topic: &str,
        shop: &str,
        body: &str,
        secret: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Shopify-Topic", topic)
            .header("X-Shopify-Shop-Domain", shop)
            .header(
                "X-Shopify-Hmac-Sha256",
                sign_webhook(secret.as_bytes(), body.as_bytes()),
            )
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }
}

/// Collected response of one request.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Value of a response header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
