//! Caller identity extractor.
//!
//! Authentication happens at the gateway, which forwards the caller as
//! `X-User-Id` and `X-Business-Id` headers.

use std::str::FromStr;

use axum::{extract::FromRequestParts, http::request::Parts};
use storelink_core::{BusinessId, UserId};

use crate::error::AppError;

/// Header carrying the authenticated user.
pub const HEADER_USER_ID: &str = "x-user-id";

/// Header carrying the user's business.
pub const HEADER_BUSINESS_ID: &str = "x-business-id";

/// The authenticated caller.
///
/// Rejects with `401` when either header is absent and `400` when one does
/// not parse.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(caller: CallerIdentity) -> impl IntoResponse {
///     format!("business {}", caller.business_id)
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: UserId,
    pub business_id: BusinessId,
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id: UserId = header(parts, HEADER_USER_ID)?;
        let business_id: BusinessId = header(parts, HEADER_BUSINESS_ID)?;

        sentry::configure_scope(|scope| {
            scope.set_user(Some(sentry::User {
                id: Some(user_id.to_string()),
                ..Default::default()
            }));
            scope.set_tag("business_id", business_id);
        });

        Ok(Self {
            user_id,
            business_id,
        })
    }
}

fn header<T: FromStr>(parts: &Parts, name: &'static str) -> Result<T, AppError> {
    let value = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

    value
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid {name} header")))
}
