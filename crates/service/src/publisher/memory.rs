//! In-memory publisher for tests and local runs.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use storelink_core::{BusEvent, CanonicalOrder};
use tokio::sync::{Mutex, Notify};

use super::{OrderPublisher, PublishError, SyncEventPublisher};

/// Records every published order and event.
///
/// Orders whose external ID was registered with [`Self::rejecting`] fail
/// with `PublishError::Rejected`.
#[derive(Default)]
pub struct MemoryPublisher {
    orders: Mutex<Vec<CanonicalOrder>>,
    events: Mutex<Vec<BusEvent>>,
    rejected: HashSet<String>,
    notify: Notify,
}

impl MemoryPublisher {
    /// Create an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher that rejects the given external order IDs.
    #[must_use]
    pub fn rejecting<I, S>(external_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rejected: external_ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Snapshot of published orders.
    pub async fn orders(&self) -> Vec<CanonicalOrder> {
        self.orders.lock().await.clone()
    }

    /// Snapshot of published events.
    pub async fn events(&self) -> Vec<BusEvent> {
        self.events.lock().await.clone()
    }

    /// Wait until at least `count` orders were published or `timeout`
    /// elapses, then return what was published.
    pub async fn wait_for_orders(&self, count: usize, timeout: Duration) -> Vec<CanonicalOrder> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            {
                let orders = self.orders.lock().await;
                if orders.len() >= count {
                    return orders.clone();
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.orders().await;
            }
        }
    }
}

#[async_trait]
impl OrderPublisher for MemoryPublisher {
    async fn publish(&self, order: &CanonicalOrder) -> Result<(), PublishError> {
        if self.rejected.contains(&order.external_id) {
            return Err(PublishError::Rejected(format!(
                "order {} rejected",
                order.external_id
            )));
        }
        self.orders.lock().await.push(order.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl SyncEventPublisher for MemoryPublisher {
    async fn publish_event(&self, event: &BusEvent) -> Result<(), PublishError> {
        self.events.lock().await.push(event.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use storelink_core::IntegrationId;

    use crate::orders::{OrderOwner, translate};

    fn order(id: i64) -> CanonicalOrder {
        let owner = OrderOwner {
            integration_id: IntegrationId::new(1),
            business_id: None,
        };
        let raw = format!(r#"{{"id":{id}}}"#);
        translate(raw.as_bytes(), &owner, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_registered_ids() {
        let publisher = MemoryPublisher::rejecting(["2"]);
        assert!(publisher.publish(&order(1)).await.is_ok());
        assert!(matches!(
            publisher.publish(&order(2)).await,
            Err(PublishError::Rejected(_))
        ));
        assert_eq!(publisher.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_orders_wakes_on_publish() {
        let publisher = Arc::new(MemoryPublisher::new());

        let background = Arc::clone(&publisher);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            background.publish(&order(7)).await.unwrap();
        });

        let orders = publisher.wait_for_orders(1, Duration::from_secs(2)).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].external_id, "7");
    }

    #[tokio::test]
    async fn test_wait_for_orders_times_out() {
        let publisher = MemoryPublisher::new();
        let orders = publisher
            .wait_for_orders(1, Duration::from_millis(20))
            .await;
        assert!(orders.is_empty());
    }
}
