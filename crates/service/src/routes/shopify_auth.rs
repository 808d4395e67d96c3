//! Storefront OAuth routes.
//!
//! The connect endpoints return the authorization URL, the storefront sends
//! the merchant back to `/shopify/callback`, and the host UI collects the
//! access token once through `/integrations/shopify/oauth/token`.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::CallerIdentity;
use crate::oauth::{AppCredentials, AuthorizationStart, HANDOFF_COOKIE, Initiator};
use crate::state::AppState;

/// Build the OAuth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/integrations/shopify/connect", post(connect))
        .route("/integrations/shopify/connect/custom", post(connect_custom))
        .route("/shopify/callback", get(callback))
        .route("/integrations/shopify/oauth/token", get(oauth_token))
        .route("/integrations/shopify/config", get(public_config))
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub name: String,
    pub shop: String,
}

#[derive(Deserialize)]
pub struct ConnectCustomRequest {
    pub name: String,
    pub shop: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct PublicConfigResponse {
    pub client_id: Option<String>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /integrations/shopify/connect - Start OAuth with the configured app.
#[instrument(skip_all)]
async fn connect(
    State(state): State<AppState>,
    caller: CallerIdentity,
    headers: HeaderMap,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<AuthorizationStart>, AppError> {
    let redirect_uri = redirect_uri(&state, &headers);
    let start = state
        .oauth()
        .initiate(&body.name, &body.shop, initiator(caller), None, &redirect_uri)
        .await?;
    Ok(Json(start))
}

/// POST /integrations/shopify/connect/custom - Start OAuth with per-request
/// app credentials.
#[instrument(skip_all)]
async fn connect_custom(
    State(state): State<AppState>,
    caller: CallerIdentity,
    headers: HeaderMap,
    Json(body): Json<ConnectCustomRequest>,
) -> Result<Json<AuthorizationStart>, AppError> {
    if body.client_id.trim().is_empty() || body.client_secret.trim().is_empty() {
        return Err(AppError::BadRequest(
            "client_id and client_secret are required".to_string(),
        ));
    }

    let redirect_uri = redirect_uri(&state, &headers);
    let credentials = AppCredentials {
        client_id: body.client_id.trim().to_string(),
        client_secret: SecretString::from(body.client_secret),
    };
    let start = state
        .oauth()
        .initiate(
            &body.name,
            &body.shop,
            initiator(caller),
            Some(credentials),
            &redirect_uri,
        )
        .await?;
    Ok(Json(start))
}

/// GET /shopify/callback - Storefront redirect after authorization.
///
/// Parks the access token and sends the browser to the host UI with the
/// handoff cookie set.
#[instrument(skip_all)]
async fn callback(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response, AppError> {
    if let Some(error) = params.get("error") {
        return Err(AppError::BadRequest(format!("authorization denied: {error}")));
    }

    let outcome = state.oauth().callback(&params).await?;
    let cookie = state.oauth().handoff_cookie(&outcome.handoff_key);

    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, outcome.redirect_url),
            (header::SET_COOKIE, cookie),
        ],
    )
        .into_response())
}

/// GET /integrations/shopify/oauth/token - Collect the parked credentials.
///
/// Works once per cookie; the cookie is cleared in the response.
async fn oauth_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let key = cookie_value(&headers, HANDOFF_COOKIE)
        .ok_or_else(|| AppError::NotFound("token not found or expired".to_string()))?;
    let token = state.oauth().retrieve_token(&key).await?;

    let body = TokenResponse {
        access_token: token.access_token.expose_secret().to_string(),
        client_id: token.client_id,
        client_secret: token.client_secret.expose_secret().to_string(),
    };
    Ok((
        [
            (header::SET_COOKIE, state.oauth().clear_handoff_cookie()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        Json(body),
    )
        .into_response())
}

/// GET /integrations/shopify/config - Client ID the frontend may display.
async fn public_config(State(state): State<AppState>) -> Json<PublicConfigResponse> {
    Json(PublicConfigResponse {
        client_id: state.oauth().public_client_id().map(str::to_string),
    })
}

// =============================================================================
// Helpers
// =============================================================================

const fn initiator(caller: CallerIdentity) -> Initiator {
    Initiator {
        user_id: caller.user_id,
        business_id: caller.business_id,
    }
}

fn redirect_uri(state: &AppState, headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| state.config().socket_addr().to_string(), str::to_string);
    state.config().redirect_uri_for(&host)
}

/// Value of a cookie from the `Cookie` header.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; shopify_oauth_token=abc123; other=1"),
        );
        assert_eq!(cookie_value(&headers, HANDOFF_COOKIE).as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("shopify_oauth_token="));
        assert_eq!(cookie_value(&headers, HANDOFF_COOKIE), None);
    }
}
