//! Storefront order to canonical order mapping.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use storelink_core::{
    BusinessId, CanonicalOrder, CanonicalOrderStatus, ChannelMetadata, CustomerSnapshot,
    GeoCoordinates, INTEGRATION_TYPE_SHOPIFY, IntegrationId, MoneyBreakdown, OrderItem,
    OrderTotals, ShippingAddress,
};

use crate::shopify::{
    MoneySet, ShopifyAddress, ShopifyLineItem, ShopifyOrder, parse_timestamp,
};

/// Substrings that mark a gateway or tag as cash-on-delivery.
const COD_MARKERS: &[&str] = &["cod", "cash", "contra"];

/// The host-side owner stamped onto every mapped order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderOwner {
    pub integration_id: IntegrationId,
    pub business_id: Option<BusinessId>,
}

/// Map a storefront order onto the canonical DTO.
///
/// Shipments, COD detection and enrichment are separate passes that work
/// on the raw JSON (see [`super::translate`]).
#[must_use]
pub fn map_order(
    order: &ShopifyOrder,
    raw: &[u8],
    owner: &OrderOwner,
    now: DateTime<Utc>,
) -> CanonicalOrder {
    let money = resolve_money(order);

    let occurred_at = [&order.processed_at, &order.created_at]
        .into_iter()
        .flatten()
        .find_map(|ts| parse_timestamp(ts))
        .unwrap_or(now);

    let cancelled = order
        .cancelled_at
        .as_deref()
        .is_some_and(|ts| !ts.trim().is_empty());

    let channel_metadata = (!raw.is_empty()).then(|| ChannelMetadata::from_raw(raw, now));

    CanonicalOrder {
        integration_id: owner.integration_id,
        integration_type: INTEGRATION_TYPE_SHOPIFY.to_string(),
        business_id: owner.business_id,
        external_id: order.id.to_string(),
        order_number: order_number(order),
        totals: money.totals,
        currency: money.currency,
        shop_money: money.shop,
        presentment_money: money.presentment,
        cod_total: None,
        customer: map_customer(order),
        origin_status: order
            .financial_status
            .clone()
            .unwrap_or_else(|| "pending".to_string()),
        status: CanonicalOrderStatus::from_storefront(
            order.financial_status.as_deref(),
            order.fulfillment_status.as_deref(),
            cancelled,
        ),
        financial_status: order.financial_status.clone(),
        fulfillment_status: order.fulfillment_status.clone(),
        occurred_at,
        imported_at: now,
        items: order
            .line_items
            .iter()
            .enumerate()
            .map(|(index, item)| map_line_item(index, item))
            .collect(),
        shipping_address: map_address(
            order.shipping_address.as_ref(),
            order
                .customer
                .as_ref()
                .and_then(|c| c.default_address.as_ref()),
        ),
        shipments: Vec::new(),
        channel_metadata,
        financial_details: None,
        shipping_details: None,
        payment_details: None,
        fulfillment_details: None,
    }
}

fn order_number(order: &ShopifyOrder) -> String {
    order
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| order.order_number.map(|n| n.to_string()))
        .unwrap_or_else(|| order.id.to_string())
}

// =============================================================================
// Money
// =============================================================================

struct ResolvedMoney {
    totals: OrderTotals,
    currency: String,
    shop: Option<MoneyBreakdown>,
    presentment: Option<MoneyBreakdown>,
}

/// One monetary field resolved from its money set and flat fallback.
struct FieldMoney {
    shop: Decimal,
    presentment: Option<Decimal>,
}

impl FieldMoney {
    fn new(set: Option<&MoneySet>, flat: Option<Decimal>) -> Self {
        let shop = set
            .and_then(|s| s.shop_money.as_ref())
            .and_then(|m| m.amount)
            .or(flat)
            .unwrap_or_default();

        let presentment = set
            .and_then(|s| s.presentment_money.as_ref())
            .filter(|m| {
                m.currency_code
                    .as_deref()
                    .is_some_and(|c| !c.trim().is_empty())
            })
            .and_then(|m| m.amount)
            .filter(|amount| *amount > Decimal::ZERO);

        Self { shop, presentment }
    }

    fn preferred(&self) -> Decimal {
        self.presentment.unwrap_or(self.shop)
    }
}

fn resolve_money(order: &ShopifyOrder) -> ResolvedMoney {
    let shipping_lines_total: Option<Decimal> = if order.shipping_lines.is_empty() {
        None
    } else {
        Some(order.shipping_lines.iter().filter_map(|l| l.price).sum())
    };

    let subtotal = FieldMoney::new(order.subtotal_price_set.as_ref(), order.subtotal_price);
    let tax = FieldMoney::new(order.total_tax_set.as_ref(), order.total_tax);
    let discount = FieldMoney::new(order.total_discounts_set.as_ref(), order.total_discounts);
    let shipping = FieldMoney::new(order.total_shipping_price_set.as_ref(), shipping_lines_total);
    let total = FieldMoney::new(order.total_price_set.as_ref(), order.total_price);

    let shop_currency = order
        .currency
        .clone()
        .or_else(|| set_currency(order.total_price_set.as_ref(), false))
        .unwrap_or_default();

    let presentment_currency = order
        .presentment_currency
        .clone()
        .filter(|c| !c.trim().is_empty())
        .or_else(|| set_currency(order.total_price_set.as_ref(), true));

    let shop_totals = OrderTotals {
        subtotal: subtotal.shop,
        tax: tax.shop,
        discount: discount.shop,
        shipping: shipping.shop,
        total: total.shop,
    };

    let has_presentment = [&subtotal, &tax, &discount, &shipping, &total]
        .iter()
        .any(|f| f.presentment.is_some());

    let presentment = match (&presentment_currency, has_presentment) {
        (Some(currency), true) => Some(MoneyBreakdown {
            currency: currency.clone(),
            totals: OrderTotals {
                subtotal: subtotal.presentment.unwrap_or_default(),
                tax: tax.presentment.unwrap_or_default(),
                discount: discount.presentment.unwrap_or_default(),
                shipping: shipping.presentment.unwrap_or_default(),
                total: total.presentment.unwrap_or_default(),
            },
        }),
        _ => None,
    };

    let currency = match (&presentment_currency, total.presentment) {
        (Some(currency), Some(_)) => currency.clone(),
        _ => shop_currency.clone(),
    };

    ResolvedMoney {
        totals: OrderTotals {
            subtotal: subtotal.preferred(),
            tax: tax.preferred(),
            discount: discount.preferred(),
            shipping: shipping.preferred(),
            total: total.preferred(),
        },
        currency,
        shop: Some(MoneyBreakdown {
            currency: shop_currency,
            totals: shop_totals,
        }),
        presentment,
    }
}

fn set_currency(set: Option<&MoneySet>, presentment: bool) -> Option<String> {
    let set = set?;
    let money = if presentment {
        set.presentment_money.as_ref()
    } else {
        set.shop_money.as_ref()
    };
    money
        .and_then(|m| m.currency_code.clone())
        .filter(|c| !c.trim().is_empty())
}

// =============================================================================
// Customer, items, address
// =============================================================================

fn map_customer(order: &ShopifyOrder) -> CustomerSnapshot {
    let customer = order.customer.clone().unwrap_or_default();

    CustomerSnapshot {
        external_id: customer.id.map(|id| id.to_string()),
        first_name: customer.first_name,
        last_name: customer.last_name,
        email: non_empty(customer.email)
            .or_else(|| non_empty(order.email.clone()))
            .or_else(|| non_empty(order.contact_email.clone())),
        phone: non_empty(customer.phone).or_else(|| non_empty(order.phone.clone())),
        orders_count: customer.orders_count.unwrap_or_default(),
        total_spent: customer.total_spent.unwrap_or_default(),
    }
}

fn map_line_item(index: usize, item: &ShopifyLineItem) -> OrderItem {
    let product_id = item.product_id.map(|id| id.to_string()).unwrap_or_default();
    let variant_id = item.variant_id.map(|id| id.to_string()).unwrap_or_default();

    let sku = non_empty(item.sku.clone()).unwrap_or_else(|| {
        if !variant_id.is_empty() {
            format!("VAR-{variant_id}")
        } else if !product_id.is_empty() {
            format!("PROD-{product_id}")
        } else {
            format!("ITEM-{}", index + 1)
        }
    });

    let unit_price = item.price.unwrap_or_default();
    let discount = item.total_discount.unwrap_or_default();
    let tax: Decimal = item.tax_lines.iter().filter_map(|t| t.price).sum();
    let total_price = (unit_price * Decimal::from(item.quantity) - discount).max(Decimal::ZERO);

    OrderItem {
        product_id,
        variant_id,
        sku,
        name: non_empty(item.name.clone())
            .or_else(|| item.title.clone())
            .unwrap_or_default(),
        quantity: item.quantity,
        unit_price,
        total_price,
        discount,
        tax,
        weight_grams: item.grams,
    }
}

fn map_address(
    shipping: Option<&ShopifyAddress>,
    default_address: Option<&ShopifyAddress>,
) -> Option<ShippingAddress> {
    let address = shipping?;

    let address2 = non_empty(address.address2.clone())
        .or_else(|| default_address.and_then(|d| non_empty(d.address2.clone())));

    let coordinates = match (address.latitude, address.longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoCoordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };

    Some(ShippingAddress {
        name: address.name.clone(),
        first_name: address.first_name.clone(),
        last_name: address.last_name.clone(),
        company: address.company.clone(),
        address1: address.address1.clone(),
        address2,
        city: address.city.clone(),
        province: address.province.clone(),
        province_code: address.province_code.clone(),
        country: address.country.clone(),
        country_code: address.country_code.clone(),
        zip: address.zip.clone(),
        phone: address.phone.clone(),
        coordinates,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// =============================================================================
// Cash on delivery
// =============================================================================

/// Scan a raw payload for cash-on-delivery markers.
///
/// Looks at every `payment_gateway_names` array and every `tags` string at
/// any depth.
#[must_use]
pub fn detect_cod(raw: &Value) -> bool {
    match raw {
        Value::Object(map) => map.iter().any(|(key, value)| {
            let direct = match (key.as_str(), value) {
                ("payment_gateway_names", Value::Array(names)) => names
                    .iter()
                    .filter_map(Value::as_str)
                    .any(has_cod_marker),
                ("tags", Value::String(tags)) => has_cod_marker(tags),
                _ => false,
            };
            direct || detect_cod(value)
        }),
        Value::Array(items) => items.iter().any(detect_cod),
        _ => false,
    }
}

fn has_cod_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    COD_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner() -> OrderOwner {
        OrderOwner {
            integration_id: IntegrationId::new(100),
            business_id: Some(BusinessId::new(7)),
        }
    }

    fn order(value: Value) -> ShopifyOrder {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_owner_fields_are_stamped() {
        let mapped = map_order(&order(json!({"id": 42})), b"{}", &owner(), Utc::now());
        assert_eq!(mapped.integration_id, IntegrationId::new(100));
        assert_eq!(mapped.business_id, Some(BusinessId::new(7)));
        assert_eq!(mapped.integration_type, "shopify");
        assert_eq!(mapped.order_number, "42");
    }

    #[test]
    fn test_order_number_prefers_name() {
        let mapped = map_order(
            &order(json!({"id": 1, "name": "#1001", "order_number": 1001})),
            b"",
            &owner(),
            Utc::now(),
        );
        assert_eq!(mapped.order_number, "#1001");
        assert!(mapped.channel_metadata.is_none());
    }

    #[test]
    fn test_sku_fallbacks() {
        let mapped = map_order(
            &order(json!({
                "id": 1,
                "line_items": [
                    {"sku": "REAL", "variant_id": 1, "quantity": 1},
                    {"sku": "", "variant_id": 22, "product_id": 11, "quantity": 1},
                    {"product_id": 11, "quantity": 1},
                    {"quantity": 1}
                ]
            })),
            b"",
            &owner(),
            Utc::now(),
        );

        let skus: Vec<&str> = mapped.items.iter().map(|i| i.sku.as_str()).collect();
        assert_eq!(skus, vec!["REAL", "VAR-22", "PROD-11", "ITEM-4"]);
    }

    #[test]
    fn test_line_total_is_clamped() {
        let mapped = map_order(
            &order(json!({
                "id": 1,
                "line_items": [
                    {"quantity": 3, "price": "10.00", "total_discount": "5.00",
                     "tax_lines": [{"price": "1.50"}, {"price": "0.50"}], "grams": 300},
                    {"quantity": 1, "price": "10.00", "total_discount": "15.00"}
                ]
            })),
            b"",
            &owner(),
            Utc::now(),
        );

        let first = &mapped.items[0];
        assert_eq!(first.total_price, Decimal::new(2500, 2));
        assert_eq!(first.tax, Decimal::new(200, 2));
        assert_eq!(first.weight_grams, Some(300));
        assert_eq!(mapped.items[1].total_price, Decimal::ZERO);
    }

    #[test]
    fn test_presentment_money_preferred() {
        let mapped = map_order(
            &order(json!({
                "id": 1,
                "currency": "USD",
                "presentment_currency": "EUR",
                "total_price": "110.00",
                "total_price_set": {
                    "shop_money": {"amount": "110.00", "currency_code": "USD"},
                    "presentment_money": {"amount": "100.00", "currency_code": "EUR"}
                },
                "total_tax_set": {
                    "shop_money": {"amount": "11.00", "currency_code": "USD"},
                    "presentment_money": {"amount": "0.00", "currency_code": "EUR"}
                }
            })),
            b"",
            &owner(),
            Utc::now(),
        );

        assert_eq!(mapped.currency, "EUR");
        assert_eq!(mapped.totals.total, Decimal::new(10000, 2));
        // zero presentment amount falls back to shop money
        assert_eq!(mapped.totals.tax, Decimal::new(1100, 2));

        let shop = mapped.shop_money.unwrap();
        assert_eq!(shop.currency, "USD");
        assert_eq!(shop.totals.total, Decimal::new(11000, 2));

        let presentment = mapped.presentment_money.unwrap();
        assert_eq!(presentment.currency, "EUR");
        assert_eq!(presentment.totals.total, Decimal::new(10000, 2));
    }

    #[test]
    fn test_empty_presentment_currency_falls_back() {
        let mapped = map_order(
            &order(json!({
                "id": 1,
                "currency": "USD",
                "total_price_set": {
                    "shop_money": {"amount": "50.00", "currency_code": "USD"},
                    "presentment_money": {"amount": "45.00", "currency_code": ""}
                }
            })),
            b"",
            &owner(),
            Utc::now(),
        );

        assert_eq!(mapped.currency, "USD");
        assert_eq!(mapped.totals.total, Decimal::new(5000, 2));
        assert!(mapped.presentment_money.is_none());
    }

    #[test]
    fn test_shipping_from_lines_when_no_set() {
        let mapped = map_order(
            &order(json!({
                "id": 1,
                "shipping_lines": [{"price": "4.00"}, {"price": "1.00"}]
            })),
            b"",
            &owner(),
            Utc::now(),
        );
        assert_eq!(mapped.totals.shipping, Decimal::new(500, 2));
    }

    #[test]
    fn test_customer_snapshot_fallbacks() {
        let mapped = map_order(
            &order(json!({
                "id": 1,
                "email": "order@example.com",
                "phone": "+34600000000",
                "customer": {"id": 5, "first_name": "Ana", "email": "", "orders_count": 3, "total_spent": "99.90"}
            })),
            b"",
            &owner(),
            Utc::now(),
        );

        let customer = mapped.customer;
        assert_eq!(customer.external_id.as_deref(), Some("5"));
        assert_eq!(customer.email.as_deref(), Some("order@example.com"));
        assert_eq!(customer.phone.as_deref(), Some("+34600000000"));
        assert_eq!(customer.orders_count, 3);
        assert_eq!(customer.total_spent, Decimal::new(9990, 2));
    }

    #[test]
    fn test_address_secondary_line_fallback() {
        let mapped = map_order(
            &order(json!({
                "id": 1,
                "shipping_address": {"address1": "Main 1", "address2": ""},
                "customer": {"default_address": {"address2": "Apt 4"}}
            })),
            b"",
            &owner(),
            Utc::now(),
        );

        let address = mapped.shipping_address.unwrap();
        assert_eq!(address.address2.as_deref(), Some("Apt 4"));
        assert!(address.coordinates.is_none());
    }

    #[test]
    fn test_cancelled_and_timestamps() {
        let now = Utc::now();
        let mapped = map_order(
            &order(json!({
                "id": 1,
                "financial_status": "paid",
                "created_at": "2024-05-01T12:00:00Z",
                "cancelled_at": "2024-05-02T12:00:00Z"
            })),
            b"",
            &owner(),
            now,
        );

        assert_eq!(mapped.status, CanonicalOrderStatus::Cancelled);
        assert_eq!(mapped.origin_status, "paid");
        assert_eq!(mapped.occurred_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(mapped.imported_at, now);
    }

    #[test]
    fn test_detect_cod() {
        assert!(detect_cod(&json!({"payment_gateway_names": ["Cash on Delivery"]})));
        assert!(detect_cod(&json!({"tags": "vip, ContraEntrega"})));
        assert!(detect_cod(&json!({"note_attributes": [{"nested": {"tags": "cod"}}]})));
        assert!(!detect_cod(&json!({"payment_gateway_names": ["shopify_payments"], "tags": "vip"})));
        // tags must be a string, gateway names an array
        assert!(!detect_cod(&json!({"tags": ["cod"], "payment_gateway_names": "cod"})));
    }
}
