//! Storefront REST response shapes.
//!
//! Only the fields the order mapper and the subscription manager read are
//! modelled. Monetary amounts arrive as strings (`"10.00"`), occasionally as
//! numbers, and are read leniently.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Shop
// =============================================================================

/// Shop information returned by `GET /shop.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopInfo {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub myshopify_domain: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub plan_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ShopEnvelope {
    pub shop: ShopInfo,
}

// =============================================================================
// Orders
// =============================================================================

/// One page of orders.
///
/// Orders are kept as raw JSON so callers can retain the exact payload and
/// tolerate individual orders that fail to deserialize.
#[derive(Debug, Clone, Default)]
pub struct OrdersPage {
    pub orders: Vec<serde_json::Value>,
    /// Continuation URL from the `Link` header, `None` when exhausted.
    pub next_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrdersEnvelope {
    #[serde(default)]
    pub orders: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderEnvelope {
    pub order: ShopifyOrder,
}

/// Query parameters for `GET /orders.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// `open`, `closed`, `cancelled` or `any`.
    pub status: Option<String>,
    /// Page size; clamped to `1..=250`, non-positive values use the default.
    pub limit: Option<i64>,
    pub created_at_min: Option<DateTime<Utc>>,
    pub created_at_max: Option<DateTime<Utc>>,
    pub updated_at_min: Option<DateTime<Utc>>,
    pub updated_at_max: Option<DateTime<Utc>>,
    pub processed_at_min: Option<DateTime<Utc>>,
    pub processed_at_max: Option<DateTime<Utc>>,
    pub financial_status: Option<String>,
    pub fulfillment_status: Option<String>,
    pub since_id: Option<i64>,
    /// Comma-separated field list.
    pub fields: Option<String>,
}

/// A storefront order, as returned by the REST API and sent by webhooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopifyOrder {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order_number: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub processed_at: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<String>,

    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub presentment_currency: Option<String>,

    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub subtotal_price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_tax: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_discounts: Option<Decimal>,

    #[serde(default)]
    pub total_price_set: Option<MoneySet>,
    #[serde(default)]
    pub subtotal_price_set: Option<MoneySet>,
    #[serde(default)]
    pub total_tax_set: Option<MoneySet>,
    #[serde(default)]
    pub total_discounts_set: Option<MoneySet>,
    #[serde(default)]
    pub total_shipping_price_set: Option<MoneySet>,

    #[serde(default)]
    pub financial_status: Option<String>,
    #[serde(default)]
    pub fulfillment_status: Option<String>,

    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub payment_gateway_names: Vec<String>,
    #[serde(default)]
    pub source_name: Option<String>,

    #[serde(default)]
    pub customer: Option<ShopifyCustomer>,
    #[serde(default)]
    pub shipping_address: Option<ShopifyAddress>,
    #[serde(default)]
    pub billing_address: Option<ShopifyAddress>,
    #[serde(default)]
    pub line_items: Vec<ShopifyLineItem>,
    #[serde(default)]
    pub shipping_lines: Vec<ShopifyShippingLine>,
}

/// A shop-money/presentment-money pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneySet {
    #[serde(default)]
    pub shop_money: Option<Money>,
    #[serde(default)]
    pub presentment_money: Option<Money>,
}

/// An amount in one currency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency_code: Option<String>,
}

/// Customer embedded in an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopifyCustomer {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub orders_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_spent: Option<Decimal>,
    #[serde(default)]
    pub default_address: Option<ShopifyAddress>,
}

/// Postal address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopifyAddress {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub province_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// An order line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopifyLineItem {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub variant_id: Option<i64>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_discount: Option<Decimal>,
    #[serde(default)]
    pub grams: Option<i64>,
    #[serde(default)]
    pub tax_lines: Vec<ShopifyTaxLine>,
}

/// A tax applied to a line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopifyTaxLine {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Option<Decimal>,
}

/// A shipping method applied to the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopifyShippingLine {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Option<Decimal>,
}

// =============================================================================
// Webhooks
// =============================================================================

/// A registered webhook subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookInfo {
    pub id: i64,
    pub address: String,
    pub topic: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WebhooksEnvelope {
    #[serde(default)]
    pub webhooks: Vec<WebhookInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WebhookEnvelope {
    pub webhook: WebhookInfo,
}

// =============================================================================
// OAuth
// =============================================================================

/// Response of the authorization-code exchange.
#[derive(Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub scope: String,
}

impl std::fmt::Debug for AccessTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Parse a storefront timestamp.
///
/// Accepts RFC 3339 and bare dates.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

/// Deserialize a decimal from a string, number or null.
///
/// Empty or unparseable strings become `None`.
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| decimal_from_value(&v)))
}

/// Read a decimal out of a JSON value.
#[must_use]
pub fn decimal_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => s.trim().parse::<Decimal>().ok(),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        _ => None,
    }
}
