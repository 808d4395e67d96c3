//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                   - Liveness
//! GET  /health/ready                             - Store and cache connectivity
//!
//! # OAuth
//! POST /integrations/shopify/connect             - Start OAuth with the default app
//! POST /integrations/shopify/connect/custom      - Start OAuth with a custom app
//! GET  /shopify/callback                         - Storefront redirect target
//! GET  /integrations/shopify/oauth/token         - One-time token handoff
//! GET  /integrations/shopify/config              - Public client ID
//!
//! # Integrations
//! POST   /integrations/shopify                   - Finalize an authorized shop
//! DELETE /integrations/shopify/{id}              - Revoke
//! GET    /integrations/shopify/{id}/webhooks     - List storefront subscriptions
//! POST   /integrations/shopify/{id}/webhooks     - Subscribe to order topics
//! DELETE /integrations/shopify/{id}/webhooks/{webhook_id}
//! POST   /integrations/shopify/{id}/sync         - Start a bulk order sync
//!
//! # Webhooks (HMAC verified, no caller identity)
//! POST /integrations/shopify/webhook             - Order topics
//! POST /integrations/shopify/webhooks/compliance - Privacy topics
//! POST /integrations/shopify/webhooks/customers/data_request
//! POST /integrations/shopify/webhooks/customers/redact
//! POST /integrations/shopify/webhooks/shop/redact
//!
//! # Notification configs
//! GET    /notification-configs                   - List for the caller's business
//! POST   /notification-configs                   - Create
//! PUT    /notification-configs/sync              - Reconcile one integration
//! GET    /notification-configs/lookup            - Cached enabled rules
//! GET    /notification-configs/{id}
//! PATCH  /notification-configs/{id}
//! DELETE /notification-configs/{id}
//! POST   /notification-configs/{id}/evaluate     - Match against an order
//!
//! # Catalog
//! GET    /notification-types
//! GET    /notification-event-types
//! POST   /notification-event-types
//! DELETE /notification-event-types/{id}
//! GET    /order-statuses
//! ```

use axum::{Router, routing::get};

use crate::state::AppState;

pub mod catalog;
pub mod health;
pub mod integrations;
pub mod notifications;
pub mod shopify_auth;
pub mod webhooks;

/// Build the application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(shopify_auth::router())
        .merge(integrations::router())
        .merge(webhooks::router())
        .merge(notifications::router())
        .merge(catalog::router())
}
