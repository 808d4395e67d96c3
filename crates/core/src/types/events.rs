//! Internal bus event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::{BusinessId, IntegrationId};

/// Event category for integration lifecycle events.
pub const CATEGORY_INTEGRATION: &str = "integration";

/// Bulk-sync lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncEventType {
    #[serde(rename = "integration.sync.started")]
    Started,
    #[serde(rename = "integration.sync.completed")]
    Completed,
    #[serde(rename = "integration.sync.failed")]
    Failed,
}

impl SyncEventType {
    /// Routing key on the bus.
    #[must_use]
    pub const fn routing_key(self) -> &'static str {
        match self {
            Self::Started => "integration.sync.started",
            Self::Completed => "integration.sync.completed",
            Self::Failed => "integration.sync.failed",
        }
    }
}

/// Envelope for events published onto the internal bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub business_id: Option<BusinessId>,
    pub integration_id: IntegrationId,
    pub category: String,
    pub event_type: SyncEventType,
    pub data: Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

impl BusEvent {
    /// Build a sync lifecycle event.
    #[must_use]
    pub fn sync(
        event_type: SyncEventType,
        business_id: Option<BusinessId>,
        integration_id: IntegrationId,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            business_id,
            integration_id,
            category: CATEGORY_INTEGRATION.to_string(),
            event_type,
            data,
            occurred_at: Utc::now(),
        }
    }
}
