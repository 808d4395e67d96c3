//! Webhook topics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ShopifyError;

/// A webhook topic emitted by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookTopic {
    #[serde(rename = "orders/create")]
    OrdersCreate,
    #[serde(rename = "orders/updated")]
    OrdersUpdated,
    #[serde(rename = "orders/paid")]
    OrdersPaid,
    #[serde(rename = "orders/cancelled")]
    OrdersCancelled,
    #[serde(rename = "orders/fulfilled")]
    OrdersFulfilled,
    #[serde(rename = "orders/partially_fulfilled")]
    OrdersPartiallyFulfilled,
    #[serde(rename = "customers/data_request")]
    CustomersDataRequest,
    #[serde(rename = "customers/redact")]
    CustomersRedact,
    #[serde(rename = "shop/redact")]
    ShopRedact,
}

impl WebhookTopic {
    /// Topics we subscribe to on every connected shop.
    pub const ORDER_TOPICS: [Self; 6] = [
        Self::OrdersCreate,
        Self::OrdersUpdated,
        Self::OrdersPaid,
        Self::OrdersCancelled,
        Self::OrdersFulfilled,
        Self::OrdersPartiallyFulfilled,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrdersCreate => "orders/create",
            Self::OrdersUpdated => "orders/updated",
            Self::OrdersPaid => "orders/paid",
            Self::OrdersCancelled => "orders/cancelled",
            Self::OrdersFulfilled => "orders/fulfilled",
            Self::OrdersPartiallyFulfilled => "orders/partially_fulfilled",
            Self::CustomersDataRequest => "customers/data_request",
            Self::CustomersRedact => "customers/redact",
            Self::ShopRedact => "shop/redact",
        }
    }

    /// Whether this is an order-lifecycle topic.
    #[must_use]
    pub const fn is_order(self) -> bool {
        matches!(
            self,
            Self::OrdersCreate
                | Self::OrdersUpdated
                | Self::OrdersPaid
                | Self::OrdersCancelled
                | Self::OrdersFulfilled
                | Self::OrdersPartiallyFulfilled
        )
    }

    /// Whether this is a privacy compliance topic.
    #[must_use]
    pub const fn is_compliance(self) -> bool {
        !self.is_order()
    }

    /// Parse a topic that may be used for a subscription.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::InvalidTopic` for anything outside the order
    /// topic set.
    pub fn subscribable(topic: &str) -> Result<Self, ShopifyError> {
        topic
            .parse::<Self>()
            .ok()
            .filter(|t| t.is_order())
            .ok_or_else(|| ShopifyError::InvalidTopic(topic.to_string()))
    }
}

impl fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookTopic {
    type Err = ShopifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        [
            Self::OrdersCreate,
            Self::OrdersUpdated,
            Self::OrdersPaid,
            Self::OrdersCancelled,
            Self::OrdersFulfilled,
            Self::OrdersPartiallyFulfilled,
            Self::CustomersDataRequest,
            Self::CustomersRedact,
            Self::ShopRedact,
        ]
        .into_iter()
        .find(|t| t.as_str() == normalized)
        .ok_or_else(|| ShopifyError::InvalidTopic(s.to_string()))
    }
}
