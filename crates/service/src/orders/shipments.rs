//! Shipment extraction from raw fulfillments.

use serde_json::Value;
use storelink_core::{Shipment, ShipmentStatus};

use crate::shopify::parse_timestamp;

/// Build shipments from the `fulfillments` array of a raw order payload.
#[must_use]
pub fn extract_shipments(raw: &Value) -> Vec<Shipment> {
    raw.get("fulfillments")
        .and_then(Value::as_array)
        .map(|fulfillments| {
            fulfillments
                .iter()
                .filter(|f| f.is_object())
                .map(map_fulfillment)
                .collect()
        })
        .unwrap_or_default()
}

fn map_fulfillment(fulfillment: &Value) -> Shipment {
    let mut status = fulfillment
        .get("status")
        .and_then(Value::as_str)
        .map_or(ShipmentStatus::Pending, ShipmentStatus::from_fulfillment_status);

    // The carrier-reported state is more precise once the parcel arrives.
    if fulfillment.get("shipment_status").and_then(Value::as_str) == Some("delivered") {
        status = ShipmentStatus::Delivered;
    }

    let shipped_at = string_field(fulfillment, "created_at").and_then(|ts| parse_timestamp(&ts));
    let delivered_at = if status == ShipmentStatus::Delivered {
        string_field(fulfillment, "updated_at").and_then(|ts| parse_timestamp(&ts))
    } else {
        None
    };

    Shipment {
        external_id: fulfillment.get("id").and_then(id_to_string),
        tracking_number: scalar_or_first(fulfillment, "tracking_number", "tracking_numbers"),
        tracking_url: scalar_or_first(fulfillment, "tracking_url", "tracking_urls"),
        carrier: string_field(fulfillment, "tracking_company"),
        status,
        shipped_at,
        delivered_at,
        metadata: fulfillment.clone(),
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// The scalar field when present, else the first element of the array field.
fn scalar_or_first(value: &Value, scalar: &str, array: &str) -> Option<String> {
    string_field(value, scalar).or_else(|| {
        value
            .get(array)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    })
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
