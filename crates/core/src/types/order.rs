//! Canonical order DTO.
//!
//! This is the output contract of the integration: every storefront order,
//! whether it arrives through a webhook or a bulk sync, is translated into a
//! [`CanonicalOrder`] before it is published onto the internal bus.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{BusinessId, IntegrationId};
use super::status::{CanonicalOrderStatus, ShipmentStatus, SyncStatus};

/// Integration type tag for the storefront.
pub const INTEGRATION_TYPE_SHOPIFY: &str = "shopify";

/// Version tag attached to channel metadata.
pub const CHANNEL_METADATA_VERSION: &str = "1.0";

/// The host's platform-neutral order representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    pub integration_id: IntegrationId,
    pub integration_type: String,
    pub business_id: Option<BusinessId>,
    pub external_id: String,
    pub order_number: String,

    /// Top-level totals: presentment values when available, shop-base otherwise.
    pub totals: OrderTotals,
    pub currency: String,
    /// Totals in the merchant's base currency.
    pub shop_money: Option<MoneyBreakdown>,
    /// Totals in the customer-facing currency.
    pub presentment_money: Option<MoneyBreakdown>,
    /// Set to the grand total when the order is cash-on-delivery.
    pub cod_total: Option<Decimal>,

    pub customer: CustomerSnapshot,
    pub origin_status: String,
    pub status: CanonicalOrderStatus,
    pub financial_status: Option<String>,
    pub fulfillment_status: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub imported_at: DateTime<Utc>,

    pub items: Vec<OrderItem>,
    pub shipping_address: Option<ShippingAddress>,
    pub shipments: Vec<Shipment>,
    pub channel_metadata: Option<ChannelMetadata>,

    // Opaque enrichment blobs
    pub financial_details: Option<serde_json::Value>,
    pub shipping_details: Option<serde_json::Value>,
    pub payment_details: Option<serde_json::Value>,
    pub fulfillment_details: Option<serde_json::Value>,
}

impl CanonicalOrder {
    /// Returns `true` if this order was detected as cash-on-delivery.
    #[must_use]
    pub const fn is_cod(&self) -> bool {
        self.cod_total.is_some()
    }
}

/// Monetary totals of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// Totals in one specific currency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyBreakdown {
    pub currency: String,
    #[serde(flatten)]
    pub totals: OrderTotals,
}

/// Snapshot of the customer at the time the order was imported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub external_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub orders_count: i64,
    pub total_spent: Decimal,
}

impl CustomerSnapshot {
    /// Full display name, if any name part is known.
    #[must_use]
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// A single order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub variant_id: String,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    /// `unit_price * quantity - discount`, clamped to zero.
    pub total_price: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub weight_grams: Option<i64>,
}

/// Shipping destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub province_code: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub coordinates: Option<GeoCoordinates>,
}

/// Latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A shipment derived from a storefront fulfillment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub external_id: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub carrier: Option<String>,
    pub status: ShipmentStatus,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// The raw fulfillment object.
    pub metadata: serde_json::Value,
}

/// Where an order came from, with the untouched payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub channel_source: String,
    #[serde(with = "base64_bytes")]
    pub raw_data: Vec<u8>,
    pub version: String,
    pub received_at: DateTime<Utc>,
    pub is_latest: bool,
    pub sync_status: SyncStatus,
}

impl ChannelMetadata {
    /// Build the metadata record for a freshly received storefront payload.
    #[must_use]
    pub fn from_raw(raw_data: &[u8], received_at: DateTime<Utc>) -> Self {
        Self {
            channel_source: INTEGRATION_TYPE_SHOPIFY.to_string(),
            raw_data: raw_data.to_vec(),
            version: CHANNEL_METADATA_VERSION.to_string(),
            received_at,
            is_latest: true,
            sync_status: SyncStatus::Synced,
        }
    }
}

/// Raw payload bytes travel as standard base64 inside JSON.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
