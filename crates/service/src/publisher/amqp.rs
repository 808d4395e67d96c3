//! RabbitMQ publisher.
//!
//! Everything goes to one durable topic exchange. Orders use
//! `orders.{integration_type}`, lifecycle events use their event type
//! (`integration.sync.started`, ...).

use async_trait::async_trait;
use deadpool_lapin::{Manager, Pool, PoolError};
use lapin::{
    BasicProperties, Channel, ConnectionProperties, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
};
use secrecy::{ExposeSecret, SecretString};
use storelink_core::{BusEvent, CanonicalOrder};
use tracing::{debug, info, instrument};

use super::{OrderPublisher, PublishError, SyncEventPublisher, order_routing_key};

const POOL_SIZE: usize = 10;
const PERSISTENT: u8 = 2;

/// Publisher backed by a pooled AMQP connection.
pub struct AmqpPublisher {
    pool: Pool,
    exchange: String,
}

impl AmqpPublisher {
    /// Connect, verify the connection and declare the exchange.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Unavailable` if the broker cannot be reached
    /// or the exchange cannot be declared.
    pub async fn connect(url: &SecretString, exchange: &str) -> Result<Self, PublishError> {
        let manager = Manager::new(
            url.expose_secret().to_string(),
            ConnectionProperties::default(),
        );
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| PublishError::Unavailable(format!("failed to create pool: {e}")))?;

        let publisher = Self {
            pool,
            exchange: exchange.to_string(),
        };

        let channel = publisher.channel().await?;
        channel
            .exchange_declare(
                &publisher.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| PublishError::Unavailable(format!("failed to declare exchange: {e}")))?;

        info!(exchange = %publisher.exchange, "Connected to AMQP");
        Ok(publisher)
    }

    async fn channel(&self) -> Result<Channel, PublishError> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            PublishError::Unavailable(format!("failed to get connection from pool: {e}"))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| PublishError::Unavailable(format!("failed to create channel: {e}")))
    }

    async fn send(&self, routing_key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let channel = self.channel().await?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT);

        channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))?
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))?;

        debug!(routing_key, bytes = payload.len(), "Published message");
        Ok(())
    }
}

#[async_trait]
impl OrderPublisher for AmqpPublisher {
    #[instrument(skip(self, order), fields(integration_id = %order.integration_id, external_id = %order.external_id))]
    async fn publish(&self, order: &CanonicalOrder) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(order)?;
        self.send(&order_routing_key(order), &payload).await
    }
}

#[async_trait]
impl SyncEventPublisher for AmqpPublisher {
    #[instrument(skip(self, event), fields(integration_id = %event.integration_id))]
    async fn publish_event(&self, event: &BusEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.send(event.event_type.routing_key(), &payload).await
    }
}
