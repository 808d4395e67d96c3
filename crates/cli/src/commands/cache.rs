//! Notification cache maintenance.
//!
//! # Environment Variables
//!
//! Reads the service configuration (`DATABASE_URL`, `REDIS_URL`, ...).

use storelink_core::IntegrationId;

use super::{CommandError, open_cache};

/// Load every enabled rule into the cache.
pub async fn warmup() -> Result<(), CommandError> {
    let cache = open_cache().await?;

    let report = cache
        .warmup()
        .await
        .map_err(|e| CommandError::Failed(e.to_string()))?;

    tracing::info!(
        "Warmup complete: {} rule(s) cached, {} failed",
        report.cached,
        report.failed
    );
    if report.failed > 0 {
        tracing::warn!("Some rules could not be cached; run warmup again once Redis is healthy");
    }
    Ok(())
}

/// Drop the cached rules of one integration, or every cached rule.
pub async fn invalidate(integration: Option<IntegrationId>) -> Result<(), CommandError> {
    let cache = open_cache().await?;

    let removed = match integration {
        Some(id) => cache.invalidate_integration(id).await,
        None => cache.invalidate_all().await,
    }
    .map_err(|e| CommandError::Failed(e.to_string()))?;

    match integration {
        Some(id) => tracing::info!("Removed {removed} cache key(s) for integration {id}"),
        None => tracing::info!("Removed {removed} cache key(s)"),
    }
    Ok(())
}
