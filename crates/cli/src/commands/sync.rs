//! Bulk order sync from the command line.
//!
//! Unlike the HTTP endpoint, the command waits for the run and prints its
//! report.
//!
//! # Environment Variables
//!
//! Reads the service configuration. `AMQP_URL` is required here: a sync
//! without a bus has nowhere to publish.

use std::sync::Arc;

use storelink_core::IntegrationId;
use storelink_service::config::ServiceConfig;
use storelink_service::db;
use storelink_service::publisher::AmqpPublisher;
use storelink_service::registry::{IntegrationRegistry, PgIntegrationStore};
use storelink_service::shopify::ShopifyRestClient;
use storelink_service::sync::{OrderSyncService, SyncParams, SyncStatus};

use super::CommandError;

/// Sync the last `days` days of orders of an integration.
pub async fn orders(integration: IntegrationId, days: i64) -> Result<(), CommandError> {
    let config = ServiceConfig::from_env()?;
    let amqp_url = config
        .amqp_url
        .as_ref()
        .ok_or_else(|| CommandError::Failed("AMQP_URL is required for sync".to_string()))?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    let registry = Arc::new(IntegrationRegistry::new(Arc::new(PgIntegrationStore::new(
        pool,
        config.credentials_key.clone(),
    ))));

    tracing::info!("Connecting to message bus...");
    let publisher = Arc::new(
        AmqpPublisher::connect(amqp_url, &config.amqp_exchange)
            .await
            .map_err(|e| CommandError::Failed(e.to_string()))?,
    );

    let client = ShopifyRestClient::new(config.shopify.debug)
        .map_err(|e| CommandError::Failed(e.to_string()))?;
    let service = Arc::new(OrderSyncService::new(
        registry,
        client,
        publisher.clone(),
        publisher,
    ));

    let ticket = service
        .start(integration, &SyncParams::last_days(days))
        .await
        .map_err(|e| CommandError::Failed(e.to_string()))?;
    tracing::info!("Sync {} started for integration {integration}", ticket.sync_id);

    let report = ticket
        .handle
        .await
        .map_err(|e| CommandError::Failed(format!("sync task failed: {e}")))?;

    let summary = serde_json::to_string_pretty(&report)
        .map_err(|e| CommandError::Failed(e.to_string()))?;
    match report.status {
        SyncStatus::Completed => {
            tracing::info!("Sync complete:\n{summary}");
            Ok(())
        }
        SyncStatus::Failed => Err(CommandError::Failed(format!("sync failed:\n{summary}"))),
    }
}
