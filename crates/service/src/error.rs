//! Unified error handling for the HTTP surface.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::notifications::{KvError, NotificationError};
use crate::oauth::OAuthError;
use crate::registry::RegistryError;
use crate::shopify::ShopifyError;
use crate::subscriptions::SubscriptionError;
use crate::sync::SyncError;

/// Application-level error type for route handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Caller is not authenticated or the request is not authentic.
    #[error("{0}")]
    Unauthorized(String),

    /// Caller lacks permission or a required credential.
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate or otherwise conflicting write.
    #[error("{0}")]
    Conflict(String),

    /// The storefront is throttling us.
    #[error("{0}")]
    RateLimited(String),

    /// The storefront answered with an error.
    #[error("{0}")]
    Upstream(String),

    /// Internal server error. The message is logged, never returned.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log server errors with Sentry
        if matches!(self, Self::Internal(_) | Self::Upstream(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("Not found".to_string()),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => Self::NotFound(err.to_string()),
            RegistryError::CredentialMissing { .. } => Self::Forbidden(err.to_string()),
            RegistryError::Conflict(_) => Self::Conflict(err.to_string()),
            RegistryError::InvalidConfig(_) | RegistryError::Database(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<ShopifyError> for AppError {
    fn from(err: ShopifyError) -> Self {
        match err {
            ShopifyError::InvalidToken => Self::Unauthorized(err.to_string()),
            ShopifyError::InsufficientScope => Self::Forbidden(err.to_string()),
            ShopifyError::ShopNotFound(_) | ShopifyError::NotFound(_) => {
                Self::NotFound(err.to_string())
            }
            ShopifyError::RateLimited => Self::RateLimited(err.to_string()),
            ShopifyError::InvalidTopic(_) => Self::BadRequest(err.to_string()),
            ShopifyError::Transport { .. }
            | ShopifyError::Http(_)
            | ShopifyError::Parse(_)
            | ShopifyError::OAuth(_) => Self::Upstream(err.to_string()),
        }
    }
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::Exchange(inner) => inner.into(),
            OAuthError::TokenNotFound => Self::NotFound(err.to_string()),
            OAuthError::MissingParameter(_)
            | OAuthError::InvalidState
            | OAuthError::ShopMismatch
            | OAuthError::InvalidHmac
            | OAuthError::MissingCredentials => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Registry(inner) => inner.into(),
            SubscriptionError::Shopify(inner) => inner.into(),
            SubscriptionError::MissingStoreName(_)
            | SubscriptionError::InvalidBaseUrl(_)
            | SubscriptionError::Loopback(_) => Self::BadRequest(err.to_string()),
            SubscriptionError::NoneCreated(_) => Self::Upstream(err.to_string()),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Registry(inner) => inner.into(),
            SyncError::Shopify(inner) => inner.into(),
            SyncError::InvalidWindow => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::RuleNotFound(_) | NotificationError::NotFound(_) => {
                Self::NotFound(err.to_string())
            }
            NotificationError::Conflict(message) => Self::Conflict(message),
            NotificationError::Validation(message) => Self::BadRequest(message),
            NotificationError::EventTypeInUse { .. } => Self::Conflict(err.to_string()),
            NotificationError::Repository(inner) => inner.into(),
            NotificationError::Kv(inner) => inner.into(),
        }
    }
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        Self::Internal(err.to_string())
    }
}
