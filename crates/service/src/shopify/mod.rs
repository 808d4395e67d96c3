//! Storefront admin REST API client.
//!
//! # Architecture
//!
//! - Plain JSON over `reqwest`, pinned to API version [`API_VERSION`]
//! - Cursor pagination through the `Link` response header
//! - No retries: every non-2xx response is mapped to a typed [`ShopifyError`]
//!   and the caller decides what to do
//!
//! # Example
//!
//! ```rust,ignore
//! use storelink_service::shopify::{OrderQuery, ShopifyRestClient};
//!
//! let client = ShopifyRestClient::new(false)?;
//! let shop = client.validate_token("demo.myshopify.com", &token).await?;
//!
//! let page = client.get_orders("demo", &token, &OrderQuery::default()).await?;
//! if let Some(next) = page.next_page_url {
//!     let more = client.get_orders_by_url(&next, &token).await?;
//! }
//! ```

mod client;
pub mod topics;
pub mod types;

pub use client::{
    API_VERSION, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, ShopifyRestClient, effective_page_size,
    parse_next_link,
};
pub use topics::WebhookTopic;
pub use types::*;

use thiserror::Error;

/// Errors that can occur when talking to the storefront API.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// The access token was rejected (HTTP 401).
    #[error("invalid access token")]
    InvalidToken,

    /// The access token lacks a required scope (HTTP 403).
    #[error("the access token is missing a required scope")]
    InsufficientScope,

    /// The shop does not exist (HTTP 404 on shop-level calls).
    #[error("shop not found: {0}")]
    ShopNotFound(String),

    /// A resource inside the shop does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The storefront is throttling us (HTTP 429).
    #[error("rate limited by the storefront, try again shortly")]
    RateLimited,

    /// Any other non-2xx response.
    #[error("storefront returned HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Topic is not one we subscribe to.
    #[error("invalid webhook topic: {0}")]
    InvalidTopic(String),

    /// Authorization code exchange failed.
    #[error("OAuth error: {0}")]
    OAuth(String),
}

impl ShopifyError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::InsufficientScope => "insufficient_scope",
            Self::ShopNotFound(_) => "shop_not_found",
            Self::NotFound(_) => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Transport { .. } | Self::Http(_) => "transport_error",
            Self::Parse(_) => "parse_error",
            Self::InvalidTopic(_) => "invalid_topic",
            Self::OAuth(_) => "oauth_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShopifyError::ShopNotFound("demo.myshopify.com".to_string());
        assert_eq!(err.to_string(), "shop not found: demo.myshopify.com");

        let err = ShopifyError::Transport {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "storefront returned HTTP 500: boom");
    }

    #[test]
    fn test_rate_limited_is_user_friendly() {
        assert!(ShopifyError::RateLimited.to_string().contains("try again shortly"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ShopifyError::InvalidToken.code(), "invalid_token");
        assert_eq!(ShopifyError::InsufficientScope.code(), "insufficient_scope");
        assert_eq!(ShopifyError::RateLimited.code(), "rate_limited");
        assert_eq!(
            ShopifyError::Transport {
                status: 502,
                body: String::new()
            }
            .code(),
            "transport_error"
        );
    }
}
