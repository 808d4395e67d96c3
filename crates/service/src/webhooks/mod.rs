//! Webhook ingestion pipeline.
//!
//! Every delivery walks the same states:
//!
//! ```text
//! received -> verified -> acknowledged -> dispatched -> processed
//!                                                    \-> failed
//! ```
//!
//! The HTTP handler owns `received -> acknowledged` and answers the
//! storefront as soon as the HMAC checks out. Everything after runs on a
//! detached task (see [`WebhookPipeline::dispatch`]) so the storefront's
//! response deadline never depends on our downstream latency.

mod pipeline;
pub mod signature;

pub use pipeline::WebhookPipeline;

use axum::body::Bytes;
use thiserror::Error;

use crate::orders::MapError;
use crate::publisher::PublishError;
use crate::registry::RegistryError;
use crate::shopify::WebhookTopic;

/// Header carrying the webhook topic.
pub const HEADER_TOPIC: &str = "x-shopify-topic";

/// Header carrying the base64 HMAC-SHA256 of the body.
pub const HEADER_HMAC: &str = "x-shopify-hmac-sha256";

/// Header carrying the shop domain.
pub const HEADER_SHOP_DOMAIN: &str = "x-shopify-shop-domain";

/// Errors raised by the pipeline.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// A required header is missing.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// The topic is not one we handle.
    #[error("unsupported webhook topic: {0}")]
    UnsupportedTopic(String),

    /// The body is empty.
    #[error("webhook payload is empty")]
    EmptyPayload,

    /// No secret could be resolved for the shop.
    #[error("no webhook secret for shop {0}")]
    MissingSecret(String),

    /// The signature does not match the body.
    #[error("invalid HMAC signature")]
    InvalidSignature,

    /// Integration lookup failed during processing.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The payload could not be mapped.
    #[error(transparent)]
    Map(#[from] MapError),

    /// The canonical order could not be published.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// An illegal state transition was attempted.
    #[error("illegal webhook transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: WebhookStage,
        to: WebhookStage,
    },
}

/// Lifecycle state of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStage {
    Received,
    Verified,
    Acknowledged,
    Dispatched,
    Processed,
    Failed,
}

impl WebhookStage {
    /// Whether `next` directly follows this stage.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Verified)
                | (Self::Verified, Self::Acknowledged)
                | (Self::Acknowledged, Self::Dispatched)
                | (Self::Dispatched, Self::Processed | Self::Failed)
        )
    }

    /// Advance to `next`.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::IllegalTransition` when `next` does not
    /// directly follow this stage.
    pub fn advance(self, next: Self) -> Result<Self, WebhookError> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(WebhookError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Terminal stages.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }
}

/// One inbound delivery as received.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub topic: WebhookTopic,
    /// Normalized shop domain.
    pub shop_domain: String,
    pub hmac: String,
    /// Exact raw body, kept as received.
    pub body: Bytes,
    pub stage: WebhookStage,
}

impl WebhookDelivery {
    /// Build a delivery in the `received` stage.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::EmptyPayload` for an empty body.
    pub fn new(
        topic: WebhookTopic,
        shop_domain: &str,
        hmac: &str,
        body: Bytes,
    ) -> Result<Self, WebhookError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(WebhookError::EmptyPayload);
        }

        Ok(Self {
            topic,
            shop_domain: storelink_core::normalize_shop_domain(shop_domain),
            hmac: hmac.to_string(),
            body,
            stage: WebhookStage::Received,
        })
    }

    /// Move to the next stage.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::IllegalTransition` on an out-of-order move.
    pub fn advance(&mut self, next: WebhookStage) -> Result<(), WebhookError> {
        self.stage = self.stage.advance(next)?;
        tracing::debug!(
            topic = %self.topic,
            shop = %self.shop_domain,
            stage = ?self.stage,
            "Webhook stage"
        );
        Ok(())
    }
}
