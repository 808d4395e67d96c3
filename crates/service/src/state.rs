//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use storelink_core::INTEGRATION_TYPE_SHOPIFY;

use crate::config::ServiceConfig;
use crate::notifications::{KvStore, NotificationCache, NotificationRepository, NotificationService};
use crate::oauth::OAuthBroker;
use crate::publisher::{OrderPublisher, SyncEventPublisher};
use crate::registry::{IntegrationRegistry, IntegrationStore};
use crate::shopify::ShopifyRestClient;
use crate::subscriptions::{ShopifyRuntime, WebhookSubscriptionManager};
use crate::sync::{DEFAULT_PAGE_DELAY, OrderSyncService};
use crate::webhooks::WebhookPipeline;

/// External adapters the service is assembled from.
///
/// Production wires `PostgreSQL`, Redis and `RabbitMQ`; tests wire the
/// in-memory implementations.
pub struct Backends {
    pub integrations: Arc<dyn IntegrationStore>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub kv: Arc<dyn KvStore>,
    pub orders: Arc<dyn OrderPublisher>,
    pub events: Arc<dyn SyncEventPublisher>,
    pub shopify: ShopifyRestClient,
    /// Pause between order pages during a bulk sync.
    pub sync_page_delay: Duration,
}

impl Backends {
    /// Backends with the default sync page delay.
    #[must_use]
    pub fn new(
        integrations: Arc<dyn IntegrationStore>,
        notifications: Arc<dyn NotificationRepository>,
        kv: Arc<dyn KvStore>,
        orders: Arc<dyn OrderPublisher>,
        events: Arc<dyn SyncEventPublisher>,
        shopify: ShopifyRestClient,
    ) -> Self {
        Self {
            integrations,
            notifications,
            kv,
            orders,
            events,
            shopify,
            sync_page_delay: DEFAULT_PAGE_DELAY,
        }
    }
}

/// Application state shared across all handlers.
///
/// Cheap to clone (Arc-wrapped inner state).
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServiceConfig,
    shopify: ShopifyRestClient,
    registry: Arc<IntegrationRegistry>,
    pipeline: Arc<WebhookPipeline>,
    oauth: OAuthBroker,
    subscriptions: Arc<WebhookSubscriptionManager>,
    sync: Arc<OrderSyncService>,
    notifications: Arc<NotificationService>,
    kv: Arc<dyn KvStore>,
}

impl AppState {
    /// Assemble the services and bind the storefront integration type.
    ///
    /// Registers the teardown runtime and the observer that subscribes new
    /// integrations to order webhooks.
    pub async fn new(config: ServiceConfig, backends: Backends) -> Self {
        let Backends {
            integrations,
            notifications,
            kv,
            orders,
            events,
            shopify,
            sync_page_delay,
        } = backends;

        let registry = Arc::new(IntegrationRegistry::new(integrations));
        let subscriptions = Arc::new(WebhookSubscriptionManager::new(
            Arc::clone(&registry),
            shopify.clone(),
        ));
        registry
            .register_integration(
                INTEGRATION_TYPE_SHOPIFY,
                Arc::new(ShopifyRuntime::new(Arc::clone(&subscriptions))),
            )
            .await;
        registry
            .register_observer_for_type(
                INTEGRATION_TYPE_SHOPIFY,
                subscriptions.observer(config.webhook_base_url.clone()),
            )
            .await;

        let pipeline = Arc::new(WebhookPipeline::new(
            Arc::clone(&registry),
            Arc::clone(&orders),
            config.shopify.api_secret.clone(),
        ));
        let oauth = OAuthBroker::new(
            config.shopify.clone(),
            shopify.clone(),
            &config.frontend_url,
            !config.is_development(),
        );
        let sync = Arc::new(
            OrderSyncService::new(Arc::clone(&registry), shopify.clone(), orders, events)
                .with_page_delay(sync_page_delay),
        );
        let cache = Arc::new(NotificationCache::new(Arc::clone(&kv), Arc::clone(&notifications)));
        let notifications = Arc::new(NotificationService::new(notifications, cache));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                shopify,
                registry,
                pipeline,
                oauth,
                subscriptions,
                sync,
                notifications,
                kv,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn shopify(&self) -> &ShopifyRestClient {
        &self.inner.shopify
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<IntegrationRegistry> {
        &self.inner.registry
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<WebhookPipeline> {
        &self.inner.pipeline
    }

    #[must_use]
    pub fn oauth(&self) -> &OAuthBroker {
        &self.inner.oauth
    }

    #[must_use]
    pub fn subscriptions(&self) -> &Arc<WebhookSubscriptionManager> {
        &self.inner.subscriptions
    }

    #[must_use]
    pub fn sync(&self) -> &Arc<OrderSyncService> {
        &self.inner.sync
    }

    #[must_use]
    pub fn notifications(&self) -> &Arc<NotificationService> {
        &self.inner.notifications
    }

    #[must_use]
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.inner.kv
    }
}
