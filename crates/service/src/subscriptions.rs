//! Webhook subscriptions on connected shops.
//!
//! [`WebhookSubscriptionManager::create_webhooks`] replaces whatever points at
//! our callback URL with a fresh subscription per order topic and records the
//! resulting IDs in the integration's config. Individual storefront failures
//! are tolerated; only a run that creates nothing fails.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::{Map, Value, json};
use storelink_core::{Integration, IntegrationConfig, IntegrationId};
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::{Host, Url};

use crate::registry::{
    ACCESS_TOKEN_FIELD, IntegrationObserver, IntegrationRegistry, IntegrationRuntime,
    RegistryError,
};
use crate::shopify::{ShopifyError, ShopifyRestClient, WebhookInfo, WebhookTopic};

/// Path of the webhook receiver, appended to the public base URL.
pub const WEBHOOK_PATH: &str = "/integrations/shopify/webhook";

/// Errors raised while managing subscriptions.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The integration has no `store_name` in its config.
    #[error("integration {0} has no store_name configured")]
    MissingStoreName(IntegrationId),

    /// The base URL does not parse.
    #[error("invalid webhook base URL: {0}")]
    InvalidBaseUrl(String),

    /// The storefront cannot reach a loopback callback.
    #[error(
        "no se pueden crear webhooks en entorno de pruebas (localhost). La URL del webhook sería: {0}"
    )]
    Loopback(String),

    #[error(transparent)]
    Shopify(#[from] ShopifyError),

    /// Every create call failed.
    #[error("no webhooks were created: {0}")]
    NoneCreated(String),
}

/// A subscription created during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedWebhook {
    pub id: i64,
    pub topic: String,
}

/// A topic whose subscription could not be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedWebhook {
    pub topic: String,
    pub error: String,
}

/// Outcome of [`WebhookSubscriptionManager::create_webhooks`].
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionReport {
    pub webhook_url: String,
    pub deleted: usize,
    pub created: Vec<CreatedWebhook>,
    pub failed: Vec<FailedWebhook>,
    /// Every topic got a subscription.
    pub configured: bool,
}

/// Manages storefront webhook subscriptions for integrations.
pub struct WebhookSubscriptionManager {
    registry: Arc<IntegrationRegistry>,
    client: ShopifyRestClient,
}

impl WebhookSubscriptionManager {
    /// Create a manager.
    #[must_use]
    pub const fn new(registry: Arc<IntegrationRegistry>, client: ShopifyRestClient) -> Self {
        Self { registry, client }
    }

    async fn shop_and_token(
        &self,
        integration: &Integration,
    ) -> Result<(String, SecretString), SubscriptionError> {
        let token = self
            .registry
            .decrypt_credential(integration.id, ACCESS_TOKEN_FIELD)
            .await?;
        let shop = integration
            .config
            .store_name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or(SubscriptionError::MissingStoreName(integration.id))?;
        Ok((shop, token))
    }

    /// Subscribe the integration's shop to every order topic.
    ///
    /// # Errors
    ///
    /// - `Registry` / `MissingStoreName` when the integration can't be used
    /// - `InvalidBaseUrl` / `Loopback` for unusable callback URLs
    /// - `Shopify` when existing subscriptions can't be listed
    /// - `NoneCreated` when every create call failed
    #[instrument(skip(self), fields(integration_id = %integration_id))]
    pub async fn create_webhooks(
        &self,
        integration_id: IntegrationId,
        base_url: &str,
    ) -> Result<SubscriptionReport, SubscriptionError> {
        let integration = self.registry.get_by_id(integration_id).await?;
        let (shop, token) = self.shop_and_token(&integration).await?;
        let webhook_url = callback_url(base_url)?;

        let existing = self.client.list_webhooks(&shop, &token).await?;
        let mut deleted = 0;
        for webhook in existing
            .iter()
            .filter(|w| same_address(&w.address, &webhook_url))
        {
            match self.client.delete_webhook(&shop, &token, webhook.id).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(webhook_id = webhook.id, error = %e, "Failed to delete stale webhook");
                }
            }
        }

        let mut created = Vec::new();
        let mut failed = Vec::new();
        for topic in WebhookTopic::ORDER_TOPICS {
            match self
                .client
                .create_webhook(&shop, &token, &webhook_url, topic.as_str())
                .await
            {
                Ok(id) => created.push(CreatedWebhook {
                    id,
                    topic: topic.to_string(),
                }),
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Failed to create webhook");
                    failed.push(FailedWebhook {
                        topic: topic.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if created.is_empty() {
            let summary = failed
                .iter()
                .map(|f| format!("{}: {}", f.topic, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SubscriptionError::NoneCreated(summary));
        }

        let configured = failed.is_empty();
        let ids: Vec<i64> = created.iter().map(|c| c.id).collect();
        let patch = json_map(json!({
            "webhook_url": webhook_url,
            "webhook_configured": configured,
            "webhook_ids": ids,
        }));
        self.registry.update_config(integration_id, &patch).await?;

        info!(
            shop = %shop,
            created = created.len(),
            failed = failed.len(),
            deleted,
            "Webhooks configured"
        );

        Ok(SubscriptionReport {
            webhook_url,
            deleted,
            created,
            failed,
            configured,
        })
    }

    /// Subscriptions currently registered on the integration's shop.
    ///
    /// # Errors
    ///
    /// Returns `Registry`, `MissingStoreName` or `Shopify` errors.
    pub async fn list_webhooks(
        &self,
        integration_id: IntegrationId,
    ) -> Result<Vec<WebhookInfo>, SubscriptionError> {
        let integration = self.registry.get_by_id(integration_id).await?;
        let (shop, token) = self.shop_and_token(&integration).await?;
        Ok(self.client.list_webhooks(&shop, &token).await?)
    }

    /// Delete one subscription and drop its ID from the config.
    ///
    /// # Errors
    ///
    /// Returns `Registry`, `MissingStoreName` or `Shopify` errors. The config
    /// is left untouched when the storefront call fails.
    #[instrument(skip(self), fields(integration_id = %integration_id))]
    pub async fn delete_webhook(
        &self,
        integration_id: IntegrationId,
        webhook_id: i64,
    ) -> Result<IntegrationConfig, SubscriptionError> {
        let integration = self.registry.get_by_id(integration_id).await?;
        let (shop, token) = self.shop_and_token(&integration).await?;
        self.client.delete_webhook(&shop, &token, webhook_id).await?;

        let ids: Vec<i64> = integration
            .config
            .webhook_ids
            .iter()
            .copied()
            .filter(|id| *id != webhook_id)
            .collect();
        let mut patch = json_map(json!({ "webhook_ids": ids }));
        if ids.is_empty() {
            patch.insert("webhook_configured".to_string(), Value::Bool(false));
        }

        let config = self.registry.update_config(integration_id, &patch).await?;
        info!(webhook_id, remaining = config.webhook_ids.len(), "Webhook deleted");
        Ok(config)
    }

    /// Delete every subscription recorded on the integration, best effort.
    ///
    /// Returns how many were deleted.
    pub async fn delete_all(&self, integration: &Integration) -> usize {
        let (shop, token) = match self.shop_and_token(integration).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(integration_id = %integration.id, error = %e, "Skipping webhook teardown");
                return 0;
            }
        };

        let mut deleted = 0;
        for id in &integration.config.webhook_ids {
            match self.client.delete_webhook(&shop, &token, *id).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(webhook_id = id, error = %e, "Failed to delete webhook"),
            }
        }
        deleted
    }

    /// Observer that subscribes every newly created integration.
    ///
    /// The subscription runs on a detached task so creation never waits on
    /// the storefront. Without a base URL the observer only warns.
    #[must_use]
    pub fn observer(self: &Arc<Self>, base_url: Option<String>) -> IntegrationObserver {
        let manager = Arc::clone(self);
        Arc::new(move |integration: &Integration| {
            let Some(base_url) = base_url.clone() else {
                warn!(
                    integration_id = %integration.id,
                    "WEBHOOK_BASE_URL not set, skipping webhook subscription"
                );
                return;
            };

            let manager = Arc::clone(&manager);
            let integration_id = integration.id;
            tokio::spawn(async move {
                if let Err(e) = manager.create_webhooks(integration_id, &base_url).await {
                    warn!(integration_id = %integration_id, error = %e, "Automatic webhook subscription failed");
                }
            });
        })
    }
}

/// Runtime for storefront integrations.
pub struct ShopifyRuntime {
    manager: Arc<WebhookSubscriptionManager>,
}

impl ShopifyRuntime {
    #[must_use]
    pub const fn new(manager: Arc<WebhookSubscriptionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl IntegrationRuntime for ShopifyRuntime {
    async fn teardown(&self, integration: &Integration) {
        let deleted = self.manager.delete_all(integration).await;
        info!(integration_id = %integration.id, deleted, "Webhooks removed");
    }
}

/// Callback URL for a public base URL.
///
/// # Errors
///
/// Returns `InvalidBaseUrl` when the result does not parse and `Loopback`
/// when it points at the local machine.
pub fn callback_url(base_url: &str) -> Result<String, SubscriptionError> {
    let webhook_url = format!("{}{WEBHOOK_PATH}", base_url.trim().trim_end_matches('/'));
    let parsed =
        Url::parse(&webhook_url).map_err(|_| SubscriptionError::InvalidBaseUrl(base_url.to_string()))?;

    let loopback = match parsed.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => return Err(SubscriptionError::InvalidBaseUrl(base_url.to_string())),
    };
    if loopback {
        return Err(SubscriptionError::Loopback(webhook_url));
    }
    Ok(webhook_url)
}

/// Address equality tolerant of host case and a trailing slash.
fn same_address(a: &str, b: &str) -> bool {
    match (Url::parse(a.trim()), Url::parse(b.trim())) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.host_str() == b.host_str()
                && a.port_or_known_default() == b.port_or_known_default()
                && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
                && a.query() == b.query()
        }
        _ => {
            a.trim().trim_end_matches('/').eq_ignore_ascii_case(b.trim().trim_end_matches('/'))
        }
    }
}

fn json_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use storelink_core::{BusinessId, INTEGRATION_TYPE_SHOPIFY};
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use crate::registry::{MemoryIntegrationStore, NewIntegration};
    use crate::shopify::API_VERSION;

    const SHOP: &str = "demo.myshopify.com";
    const BASE: &str = "https://hooks.example.com";

    async fn setup(server: &MockServer) -> (Arc<WebhookSubscriptionManager>, Arc<IntegrationRegistry>, IntegrationId) {
        let registry = Arc::new(IntegrationRegistry::new(Arc::new(
            MemoryIntegrationStore::new(),
        )));
        let integration = registry
            .create(NewIntegration {
                business_id: Some(BusinessId::new(7)),
                name: "Demo".to_string(),
                code: None,
                integration_type: INTEGRATION_TYPE_SHOPIFY.to_string(),
                external_id: SHOP.to_string(),
                config: IntegrationConfig {
                    store_name: Some(SHOP.to_string()),
                    webhook_ids: vec![1, 2],
                    ..IntegrationConfig::default()
                },
                credentials: vec![(ACCESS_TOKEN_FIELD.to_string(), SecretString::from("shpat_x"))],
            })
            .await
            .unwrap();

        let client = ShopifyRestClient::with_base_url(&server.uri(), false).unwrap();
        let manager = Arc::new(WebhookSubscriptionManager::new(registry.clone(), client));
        (manager, registry, integration.id)
    }

    fn webhooks_path() -> String {
        format!("/admin/api/{API_VERSION}/webhooks.json")
    }

    #[test]
    fn test_callback_url() {
        assert_eq!(
            callback_url("https://hooks.example.com/").unwrap(),
            "https://hooks.example.com/integrations/shopify/webhook"
        );
        assert!(matches!(
            callback_url("not a url"),
            Err(SubscriptionError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_loopback_base_is_rejected() {
        for base in ["http://localhost:8080", "http://127.0.0.1", "http://[::1]:3000"] {
            let err = callback_url(base).unwrap_err();
            assert!(matches!(err, SubscriptionError::Loopback(_)), "{base}");
            assert!(err.to_string().contains("localhost"));
        }
    }

    #[test]
    fn test_same_address() {
        assert!(same_address(
            "https://HOOKS.example.com/integrations/shopify/webhook/",
            "https://hooks.example.com/integrations/shopify/webhook"
        ));
        assert!(!same_address(
            "https://hooks.example.com/other",
            "https://hooks.example.com/integrations/shopify/webhook"
        ));
    }

    #[tokio::test]
    async fn test_create_webhooks_replaces_ours_and_tolerates_failures() {
        let server = MockServer::start().await;
        let (manager, registry, id) = setup(&server).await;

        Mock::given(method("GET"))
            .and(path(webhooks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "webhooks": [
                    {"id": 10, "address": "https://HOOKS.example.com/integrations/shopify/webhook/", "topic": "orders/create"},
                    {"id": 20, "address": "https://someone-else.example.com/hook", "topic": "orders/create"}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(format!("/admin/api/{API_VERSION}/webhooks/10.json")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let next_id = AtomicI64::new(100);
        Mock::given(method("POST"))
            .and(path(webhooks_path()))
            .respond_with(move |req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                if body["webhook"]["topic"] == "orders/paid" {
                    return ResponseTemplate::new(422).set_body_string("bad topic");
                }
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(201).set_body_json(json!({
                    "webhook": {"id": id, "address": body["webhook"]["address"], "topic": body["webhook"]["topic"]}
                }))
            })
            .mount(&server)
            .await;

        let report = manager.create_webhooks(id, BASE).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.created.len(), 5);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].topic, "orders/paid");
        assert!(!report.configured);

        let config = registry.get_by_id(id).await.unwrap().config;
        assert_eq!(config.webhook_ids, vec![100, 101, 102, 103, 104]);
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("https://hooks.example.com/integrations/shopify/webhook")
        );
        assert!(!config.webhook_configured);
    }

    #[tokio::test]
    async fn test_create_webhooks_fails_when_nothing_created() {
        let server = MockServer::start().await;
        let (manager, registry, id) = setup(&server).await;

        Mock::given(method("GET"))
            .and(path(webhooks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"webhooks": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(webhooks_path()))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = manager.create_webhooks(id, BASE).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::NoneCreated(_)));

        let config = registry.get_by_id(id).await.unwrap().config;
        assert_eq!(config.webhook_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_loopback_fails_before_calling_storefront() {
        let server = MockServer::start().await;
        let (manager, _, id) = setup(&server).await;

        let err = manager
            .create_webhooks(id, "http://localhost:8080")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Loopback(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_delete_webhook_updates_config() {
        let server = MockServer::start().await;
        let (manager, _, id) = setup(&server).await;

        Mock::given(method("DELETE"))
            .and(path_regex(r"/webhooks/\d+\.json$"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = manager.delete_webhook(id, 1).await.unwrap();
        assert_eq!(config.webhook_ids, vec![2]);

        let config = manager.delete_webhook(id, 2).await.unwrap();
        assert!(config.webhook_ids.is_empty());
        assert!(!config.webhook_configured);
    }

    #[tokio::test]
    async fn test_delete_all_is_best_effort() {
        let server = MockServer::start().await;
        let (manager, registry, id) = setup(&server).await;

        Mock::given(method("DELETE"))
            .and(path(format!("/admin/api/{API_VERSION}/webhooks/1.json")))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/admin/api/{API_VERSION}/webhooks/2.json")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let integration = registry.get_by_id(id).await.unwrap();
        assert_eq!(manager.delete_all(&integration).await, 1);
    }
}
