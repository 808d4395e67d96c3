//! Translation of storefront orders into canonical orders.
//!
//! [`translate`] is the single entry point used by both the webhook
//! handlers and the bulk sync: it parses the raw payload, maps it, attaches
//! shipments and channel metadata, and runs the enrichment pass.

mod enrich;
mod mapper;
mod shipments;

pub use enrich::enrich;
pub use mapper::{OrderOwner, detect_cod, map_order};
pub use shipments::extract_shipments;

use chrono::{DateTime, Utc};
use storelink_core::CanonicalOrder;
use thiserror::Error;

use crate::shopify::ShopifyOrder;

/// Errors raised while translating a payload.
#[derive(Debug, Error)]
pub enum MapError {
    /// The payload was empty or `null`.
    #[error("order payload is empty")]
    EmptyPayload,

    /// The payload is not a storefront order.
    #[error("order payload is not valid: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Translate a raw storefront order payload into a canonical order.
///
/// # Errors
///
/// Returns `MapError::EmptyPayload` for empty or `null` bodies and
/// `MapError::Parse` when the body is not an order.
pub fn translate(
    raw: &[u8],
    owner: &OrderOwner,
    received_at: DateTime<Utc>,
) -> Result<CanonicalOrder, MapError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(MapError::EmptyPayload);
    }

    let value: serde_json::Value = serde_json::from_slice(raw)?;
    if value.is_null() {
        return Err(MapError::EmptyPayload);
    }

    let order: ShopifyOrder = serde_json::from_value(value.clone())?;
    let mut canonical = map_order(&order, raw, owner, received_at);
    canonical.shipments = extract_shipments(&value);
    if detect_cod(&value) {
        canonical.cod_total = Some(canonical.totals.total);
    }
    enrich(&mut canonical, &value);

    Ok(canonical)
}
