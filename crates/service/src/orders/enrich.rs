//! Enrichment pass: opaque detail blobs lifted from the raw payload.

use serde_json::{Map, Value};
use storelink_core::CanonicalOrder;

const FINANCIAL_KEYS: &[&str] = &[
    "financial_status",
    "total_price_set",
    "subtotal_price_set",
    "total_tax_set",
    "total_discounts_set",
    "total_shipping_price_set",
    "current_total_price_set",
    "tax_lines",
    "taxes_included",
    "discount_codes",
    "discount_applications",
    "refunds",
];

const SHIPPING_KEYS: &[&str] = &["shipping_lines", "shipping_address"];

const PAYMENT_KEYS: &[&str] = &[
    "payment_gateway_names",
    "gateway",
    "payment_terms",
    "processing_method",
    "transactions",
];

const FULFILLMENT_KEYS: &[&str] = &["fulfillment_status", "fulfillments"];

/// Attach financial, shipping, payment and fulfillment details.
///
/// A blob is only attached when at least one of its keys carries a
/// non-null value.
pub fn enrich(order: &mut CanonicalOrder, raw: &Value) {
    order.financial_details = pick(raw, FINANCIAL_KEYS);
    order.shipping_details = pick(raw, SHIPPING_KEYS);
    order.payment_details = pick(raw, PAYMENT_KEYS);
    order.fulfillment_details = pick(raw, FULFILLMENT_KEYS);
}

fn pick(raw: &Value, keys: &[&str]) -> Option<Value> {
    let source = raw.as_object()?;
    let picked: Map<String, Value> = keys
        .iter()
        .filter_map(|key| {
            source
                .get(*key)
                .filter(|v| !v.is_null())
                .map(|v| ((*key).to_string(), v.clone()))
        })
        .collect();

    (!picked.is_empty()).then_some(Value::Object(picked))
}
