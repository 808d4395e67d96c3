//! Core types for storelink.
//!
//! This module provides type-safe wrappers for the domain concepts shared
//! between the service and the CLI.

pub mod events;
pub mod id;
pub mod integration;
pub mod notification;
pub mod order;
pub mod status;

pub use events::{BusEvent, CATEGORY_INTEGRATION, SyncEventType};
pub use id::*;
pub use integration::{
    Integration, IntegrationConfig, SHOP_DOMAIN_SUFFIX, derive_integration_code,
    normalize_shop_domain,
};
pub use notification::{
    CachedRule, NotificationChannel, NotificationEventType, NotificationRule, NotificationType,
    OrderStatus, RuleSubject,
};
pub use order::{
    CHANNEL_METADATA_VERSION, CanonicalOrder, ChannelMetadata, CustomerSnapshot, GeoCoordinates,
    INTEGRATION_TYPE_SHOPIFY, MoneyBreakdown, OrderItem, OrderTotals, Shipment, ShippingAddress,
};
pub use status::*;
