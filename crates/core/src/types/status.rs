//! Status enums for canonical orders and shipments.

use serde::{Deserialize, Serialize};

/// Canonical order status.
///
/// Platform-neutral status derived from the storefront's financial and
/// fulfillment states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalOrderStatus {
    #[default]
    Pending,
    Paid,
    PartiallyFulfilled,
    Fulfilled,
    Cancelled,
    Refunded,
}

impl CanonicalOrderStatus {
    /// Derive the canonical status from storefront states.
    ///
    /// Cancellation wins over everything, refunds over fulfillment, and
    /// fulfillment over payment.
    #[must_use]
    pub fn from_storefront(
        financial_status: Option<&str>,
        fulfillment_status: Option<&str>,
        cancelled: bool,
    ) -> Self {
        if cancelled {
            return Self::Cancelled;
        }

        let financial = financial_status.map(str::to_ascii_lowercase);
        let fulfillment = fulfillment_status.map(str::to_ascii_lowercase);

        match financial.as_deref() {
            Some("refunded") => return Self::Refunded,
            Some("voided") => return Self::Cancelled,
            _ => {}
        }

        match fulfillment.as_deref() {
            Some("fulfilled") => return Self::Fulfilled,
            Some("partial" | "partially_fulfilled") => return Self::PartiallyFulfilled,
            _ => {}
        }

        match financial.as_deref() {
            Some("paid" | "partially_refunded") => Self::Paid,
            _ => Self::Pending,
        }
    }

    /// Stable string code used on the bus and in order-status catalogs.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::PartiallyFulfilled => "partially_fulfilled",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

/// Canonical shipment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    #[default]
    Pending,
    InTransit,
    Delivered,
    Failed,
}

impl ShipmentStatus {
    /// Map a storefront fulfillment status onto a shipment status.
    #[must_use]
    pub fn from_fulfillment_status(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "confirmed" | "success" => Self::InTransit,
            "delivered" => Self::Delivered,
            "failure" | "cancelled" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Sync status recorded in channel metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Synced,
    Pending,
    Failed,
}
