//! Bulk backfill of historical orders.
//!
//! [`OrderSyncService::start`] resolves the integration and announces the run
//! synchronously, then walks the storefront's order pages on a detached task.
//! Pages and the orders inside them are processed strictly in sequence. A
//! failing order is counted and skipped; a failing page fetch ends the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use storelink_core::{BusEvent, Integration, IntegrationId, SyncEventType};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, instrument, warn};
use uuid::Uuid;

use crate::orders::{MapError, OrderOwner, translate};
use crate::publisher::{OrderPublisher, PublishError, SyncEventPublisher};
use crate::registry::{ACCESS_TOKEN_FIELD, IntegrationRegistry, RegistryError};
use crate::shopify::{MAX_PAGE_SIZE, OrderQuery, OrdersPage, ShopifyError, ShopifyRestClient};

/// Pause between page fetches.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(500);

/// Window used when no lower bound is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Errors raised while starting or running a sync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Shopify(#[from] ShopifyError),

    /// The requested window is empty.
    #[error("created_at_min must be before created_at_max")]
    InvalidWindow,
}

#[derive(Debug, Error)]
enum OrderFailure {
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Filters for a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub created_at_min: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at_max: Option<DateTime<Utc>>,
    /// Order status filter (default `any`).
    #[serde(default)]
    pub status: Option<String>,
    /// Financial status filter (default `any`).
    #[serde(default)]
    pub financial_status: Option<String>,
    #[serde(default)]
    pub fulfillment_status: Option<String>,
}

impl SyncParams {
    /// Orders created in the last `days` days.
    #[must_use]
    pub fn last_days(days: i64) -> Self {
        Self {
            created_at_min: Some(Utc::now() - chrono::Duration::days(days.max(1))),
            ..Self::default()
        }
    }

    /// Build the first-page query, applying the defaults.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidWindow` if the bounds are reversed.
    pub fn to_query(&self, now: DateTime<Utc>) -> Result<OrderQuery, SyncError> {
        let created_at_min = self
            .created_at_min
            .unwrap_or_else(|| now - chrono::Duration::days(DEFAULT_WINDOW_DAYS));
        let created_at_max = self.created_at_max.unwrap_or(now);
        if created_at_min >= created_at_max {
            return Err(SyncError::InvalidWindow);
        }

        Ok(OrderQuery {
            status: Some(non_blank(self.status.as_deref()).unwrap_or("any").to_string()),
            limit: Some(MAX_PAGE_SIZE),
            created_at_min: Some(created_at_min),
            created_at_max: Some(created_at_max),
            financial_status: Some(
                non_blank(self.financial_status.as_deref())
                    .unwrap_or("any")
                    .to_string(),
            ),
            fulfillment_status: non_blank(self.fulfillment_status.as_deref()).map(str::to_string),
            ..OrderQuery::default()
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    Failed,
}

/// Counters of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub sync_id: Uuid,
    pub integration_id: IntegrationId,
    pub status: SyncStatus,
    pub pages: usize,
    pub total_orders: usize,
    pub published: usize,
    pub failed: usize,
    pub error: Option<String>,
}

/// A started run.
#[derive(Debug)]
pub struct SyncTicket {
    pub sync_id: Uuid,
    /// Resolves to the final report. Dropping it does not cancel the run.
    pub handle: JoinHandle<SyncReport>,
}

/// Runs bulk order syncs.
pub struct OrderSyncService {
    registry: Arc<IntegrationRegistry>,
    client: ShopifyRestClient,
    publisher: Arc<dyn OrderPublisher>,
    events: Arc<dyn SyncEventPublisher>,
    page_delay: Duration,
}

impl OrderSyncService {
    /// Create a service with the default page delay.
    #[must_use]
    pub fn new(
        registry: Arc<IntegrationRegistry>,
        client: ShopifyRestClient,
        publisher: Arc<dyn OrderPublisher>,
        events: Arc<dyn SyncEventPublisher>,
    ) -> Self {
        Self {
            registry,
            client,
            publisher,
            events,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// Override the pause between pages.
    #[must_use]
    pub const fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Resolve the integration, announce the run and start it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the integration or its token can't be resolved
    /// or the window is invalid. Nothing is started in that case.
    #[instrument(skip(self, params), fields(integration_id = %integration_id))]
    pub async fn start(
        self: &Arc<Self>,
        integration_id: IntegrationId,
        params: &SyncParams,
    ) -> Result<SyncTicket, SyncError> {
        let integration = self.registry.get_by_id(integration_id).await?;
        let token = self
            .registry
            .decrypt_credential(integration_id, ACCESS_TOKEN_FIELD)
            .await?;
        let query = params.to_query(Utc::now())?;
        let shop = integration.shop_domain();
        let sync_id = Uuid::new_v4();

        self.emit(
            &integration,
            SyncEventType::Started,
            json!({
                "sync_id": sync_id,
                "shop": shop,
                "created_at_min": query.created_at_min,
                "created_at_max": query.created_at_max,
            }),
        )
        .await;

        info!(sync_id = %sync_id, shop = %shop, "Order sync started");

        let service = Arc::clone(self);
        let span = tracing::info_span!("order_sync", sync_id = %sync_id, integration_id = %integration_id);
        let handle = tokio::spawn(
            async move {
                service
                    .run(sync_id, integration, shop, token, query)
                    .await
            }
            .instrument(span),
        );

        Ok(SyncTicket { sync_id, handle })
    }

    async fn run(
        &self,
        sync_id: Uuid,
        integration: Integration,
        shop: String,
        token: SecretString,
        query: OrderQuery,
    ) -> SyncReport {
        let owner = OrderOwner {
            integration_id: integration.id,
            business_id: integration.business_id,
        };
        let mut report = SyncReport {
            sync_id,
            integration_id: integration.id,
            status: SyncStatus::Completed,
            pages: 0,
            total_orders: 0,
            published: 0,
            failed: 0,
            error: None,
        };

        let mut next = self.client.get_orders(&shop, &token, &query).await;
        loop {
            let page: OrdersPage = match next {
                Ok(page) => page,
                Err(e) => {
                    error!(error = %e, pages = report.pages, "Order sync aborted");
                    report.status = SyncStatus::Failed;
                    report.error = Some(e.to_string());
                    break;
                }
            };
            report.pages += 1;

            for raw in &page.orders {
                report.total_orders += 1;
                match self.publish_one(raw, &owner).await {
                    Ok(()) => report.published += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            order_id = %raw.get("id").unwrap_or(&serde_json::Value::Null),
                            error = %e,
                            "Order skipped during sync"
                        );
                    }
                }
            }

            let Some(url) = page.next_page_url else {
                break;
            };
            tokio::time::sleep(self.page_delay).await;
            next = self.client.get_orders_by_url(&url, &token).await;
        }

        let (event_type, mut data) = match report.status {
            SyncStatus::Completed => (SyncEventType::Completed, Map::new()),
            SyncStatus::Failed => {
                let mut data = Map::new();
                data.insert(
                    "error".to_string(),
                    Value::from(report.error.clone().unwrap_or_default()),
                );
                (SyncEventType::Failed, data)
            }
        };
        data.insert("sync_id".to_string(), Value::from(sync_id.to_string()));
        data.insert("pages".to_string(), Value::from(report.pages));
        data.insert("total_orders".to_string(), Value::from(report.total_orders));
        data.insert("success_count".to_string(), Value::from(report.published));
        data.insert("error_count".to_string(), Value::from(report.failed));
        self.emit(&integration, event_type, Value::Object(data)).await;

        info!(
            status = ?report.status,
            pages = report.pages,
            total = report.total_orders,
            published = report.published,
            failed = report.failed,
            "Order sync finished"
        );
        report
    }

    async fn publish_one(&self, raw: &Value, owner: &OrderOwner) -> Result<(), OrderFailure> {
        let bytes = serde_json::to_vec(raw)?;
        let order = translate(&bytes, owner, Utc::now())?;
        self.publisher.publish(&order).await?;
        Ok(())
    }

    async fn emit(&self, integration: &Integration, event_type: SyncEventType, data: Value) {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let event = BusEvent::sync(event_type, integration.business_id, integration.id, data);
        if let Err(e) = self.events.publish_event(&event).await {
            warn!(event = event_type.routing_key(), error = %e, "Sync event not published");
        }
    }
}
