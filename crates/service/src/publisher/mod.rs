//! Outbound publication onto the internal message bus.
//!
//! Two narrow seams are published to:
//!
//! - [`OrderPublisher`] for canonical orders (webhooks and bulk sync)
//! - [`SyncEventPublisher`] for bulk-sync lifecycle events
//!
//! [`AmqpPublisher`] implements both against RabbitMQ. When the bus cannot be
//! reached at start-up, [`NoopPublisher`] is substituted; the choice is made
//! once in `main` and never revisited at runtime. [`MemoryPublisher`] records
//! everything for tests and local runs.

mod amqp;
mod memory;

pub use amqp::AmqpPublisher;
pub use memory::MemoryPublisher;

use async_trait::async_trait;
use storelink_core::{BusEvent, CanonicalOrder};
use thiserror::Error;

/// Routing key prefix for canonical orders.
pub const ORDER_ROUTING_PREFIX: &str = "orders";

/// Errors raised while publishing. None of them are retried here.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No connection or channel to the bus.
    #[error("message bus unavailable: {0}")]
    Unavailable(String),

    /// The broker refused the message.
    #[error("message rejected by the bus: {0}")]
    Rejected(String),
}

/// Publishes canonical orders.
#[async_trait]
pub trait OrderPublisher: Send + Sync {
    /// Serialize and enqueue one order.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` on any failure; callers decide whether to
    /// continue with the remaining orders.
    async fn publish(&self, order: &CanonicalOrder) -> Result<(), PublishError>;
}

/// Publishes integration lifecycle events.
#[async_trait]
pub trait SyncEventPublisher: Send + Sync {
    /// Enqueue one lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` on any failure.
    async fn publish_event(&self, event: &BusEvent) -> Result<(), PublishError>;
}

/// Routing key for a canonical order: `orders.{integration_type}`.
#[must_use]
pub fn order_routing_key(order: &CanonicalOrder) -> String {
    format!("{ORDER_ROUTING_PREFIX}.{}", order.integration_type)
}

/// Logs and succeeds. Used when no bus is configured or reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl OrderPublisher for NoopPublisher {
    async fn publish(&self, order: &CanonicalOrder) -> Result<(), PublishError> {
        tracing::info!(
            integration_id = %order.integration_id,
            external_id = %order.external_id,
            "Message bus disabled, dropping order"
        );
        Ok(())
    }
}

#[async_trait]
impl SyncEventPublisher for NoopPublisher {
    async fn publish_event(&self, event: &BusEvent) -> Result<(), PublishError> {
        tracing::info!(
            integration_id = %event.integration_id,
            event_type = event.event_type.routing_key(),
            "Message bus disabled, dropping event"
        );
        Ok(())
    }
}
