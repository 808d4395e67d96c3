//! Command implementations.

pub mod cache;
pub mod migrate;
pub mod sync;

use std::sync::Arc;

use storelink_service::config::{ConfigError, ServiceConfig};
use storelink_service::db;
use storelink_service::notifications::{
    NotificationCache, PgNotificationRepository, RedisKvStore,
};
use thiserror::Error;

/// Errors shared by the commands that need the full service configuration.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Failed(String),
}

/// Load the configuration and open the notification cache over `PostgreSQL`
/// and Redis.
async fn open_cache() -> Result<NotificationCache, CommandError> {
    let config = ServiceConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Connecting to Redis...");
    let kv = RedisKvStore::connect(&config.redis_url)
        .await
        .map_err(|e| CommandError::Failed(e.to_string()))?;

    Ok(NotificationCache::new(
        Arc::new(kv),
        Arc::new(PgNotificationRepository::new(pool)),
    ))
}
