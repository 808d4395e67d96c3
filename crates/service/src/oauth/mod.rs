//! Storefront OAuth broker.
//!
//! # Flow
//!
//! 1. [`OAuthBroker::initiate`] stores the pending authorization under a
//!    random `state` (10 minutes) and returns the storefront's consent URL.
//! 2. The storefront redirects back to the callback. [`OAuthBroker::callback`]
//!    consumes the state, checks the query HMAC, exchanges the code and
//!    parks the resulting credentials under a one-time handoff key
//!    (5 minutes) delivered to the browser as a cookie.
//! 3. The frontend calls [`OAuthBroker::retrieve_token`] once to collect the
//!    credentials, then finalizes the integration.
//!
//! Both stores are process-local; running more than one replica needs a
//! shared store instead.

mod store;

pub use store::{ExpiringStore, random_key};

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use storelink_core::{BusinessId, UserId, derive_integration_code, normalize_shop_domain};
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::ShopifyAppConfig;
use crate::shopify::{ShopifyError, ShopifyRestClient};
use crate::webhooks::signature;

/// Lifetime of a pending authorization.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Lifetime of a parked handoff token.
pub const HANDOFF_TTL: Duration = Duration::from_secs(5 * 60);

/// Cookie carrying the handoff key.
pub const HANDOFF_COOKIE: &str = "shopify_oauth_token";

/// Errors raised by the OAuth flow.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// A required input is missing or blank.
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    /// The state is unknown, expired or already used.
    #[error("invalid or expired OAuth state")]
    InvalidState,

    /// The callback's shop does not match the one that started the flow.
    #[error("shop does not match the pending authorization")]
    ShopMismatch,

    /// The callback query HMAC does not verify.
    #[error("invalid OAuth callback signature")]
    InvalidHmac,

    /// No client ID/secret is configured and none was supplied.
    #[error("storefront app credentials are not configured")]
    MissingCredentials,

    /// The code exchange failed.
    #[error("token exchange failed: {0}")]
    Exchange(#[from] ShopifyError),

    /// The handoff key is unknown, expired or already used.
    #[error("token not found or expired")]
    TokenNotFound,
}

/// Who started the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Initiator {
    pub user_id: UserId,
    pub business_id: BusinessId,
}

/// App credentials supplied per request for custom apps.
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

struct PendingAuthorization {
    name: String,
    shop: String,
    initiator: Initiator,
    client_id: String,
    client_secret: SecretString,
}

/// Credentials parked for the frontend.
#[derive(Clone)]
pub struct HandoffToken {
    pub access_token: SecretString,
    pub client_id: String,
    pub client_secret: SecretString,
}

impl std::fmt::Debug for HandoffToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffToken")
            .field("access_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Result of [`OAuthBroker::initiate`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthorizationStart {
    pub auth_url: String,
    pub state: String,
}

/// Result of [`OAuthBroker::callback`].
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    /// Host UI URL with the non-sensitive parameters.
    pub redirect_url: String,
    /// Key under which the credentials are parked.
    pub handoff_key: String,
}

/// CSRF-protected authorization-code flow.
pub struct OAuthBroker {
    app: ShopifyAppConfig,
    client: ShopifyRestClient,
    frontend_url: String,
    secure_cookies: bool,
    states: ExpiringStore<PendingAuthorization>,
    handoffs: ExpiringStore<HandoffToken>,
}

impl OAuthBroker {
    /// Create a broker with the default lifetimes.
    #[must_use]
    pub fn new(
        app: ShopifyAppConfig,
        client: ShopifyRestClient,
        frontend_url: &str,
        secure_cookies: bool,
    ) -> Self {
        Self::with_ttls(app, client, frontend_url, secure_cookies, STATE_TTL, HANDOFF_TTL)
    }

    /// Create a broker with explicit lifetimes.
    #[must_use]
    pub fn with_ttls(
        app: ShopifyAppConfig,
        client: ShopifyRestClient,
        frontend_url: &str,
        secure_cookies: bool,
        state_ttl: Duration,
        handoff_ttl: Duration,
    ) -> Self {
        Self {
            app,
            client,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            secure_cookies,
            states: ExpiringStore::new(state_ttl),
            handoffs: ExpiringStore::new(handoff_ttl),
        }
    }

    /// The client ID that may be disclosed to the frontend.
    #[must_use]
    pub fn public_client_id(&self) -> Option<&str> {
        self.app.client_id.as_deref()
    }

    /// Start an authorization.
    ///
    /// Uses `credentials` when given (custom apps), otherwise the configured
    /// default app.
    ///
    /// # Errors
    ///
    /// - `MissingParameter` for a blank name or shop
    /// - `MissingCredentials` when no app credentials are available
    #[instrument(skip(self, name, shop, credentials, redirect_uri), fields(shop))]
    pub async fn initiate(
        &self,
        name: &str,
        shop: &str,
        initiator: Initiator,
        credentials: Option<AppCredentials>,
        redirect_uri: &str,
    ) -> Result<AuthorizationStart, OAuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OAuthError::MissingParameter("name"));
        }
        let shop = normalize_shop_domain(shop);
        if shop.is_empty() {
            return Err(OAuthError::MissingParameter("shop"));
        }
        tracing::Span::current().record("shop", shop.as_str());

        let (client_id, client_secret) = match credentials {
            Some(custom) => {
                if custom.client_id.trim().is_empty() {
                    return Err(OAuthError::MissingParameter("client_id"));
                }
                if custom.client_secret.expose_secret().trim().is_empty() {
                    return Err(OAuthError::MissingParameter("client_secret"));
                }
                (custom.client_id, custom.client_secret)
            }
            None => self
                .app
                .default_credentials()
                .map(|(id, secret)| (id.to_string(), secret.clone()))
                .ok_or(OAuthError::MissingCredentials)?,
        };

        let auth_url = authorization_url(&shop, &client_id, self.app.scopes(), redirect_uri)?;

        let state = self
            .states
            .insert_random(PendingAuthorization {
                name: name.to_string(),
                shop: shop.clone(),
                initiator,
                client_id,
                client_secret,
            })
            .await;

        let auth_url = format!("{auth_url}&state={state}");
        info!(user_id = %initiator.user_id, "OAuth authorization started");

        Ok(AuthorizationStart { auth_url, state })
    }

    /// Complete an authorization from the callback query.
    ///
    /// The state is consumed before anything else is checked, so a second
    /// callback with the same state always fails.
    ///
    /// # Errors
    ///
    /// - `MissingParameter` if `code`, `shop`, `state` or `hmac` is absent
    /// - `InvalidState` / `ShopMismatch` / `InvalidHmac` on verification
    /// - `Exchange` when the storefront refuses the code
    #[instrument(skip(self, params))]
    pub async fn callback(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<CallbackOutcome, OAuthError> {
        let code = required(params, "code")?;
        let shop = required(params, "shop")?;
        let state = required(params, "state")?;
        let hmac = required(params, "hmac")?;

        let pending = self
            .states
            .take(state)
            .await
            .ok_or(OAuthError::InvalidState)?;

        let shop = normalize_shop_domain(shop);
        if shop != pending.shop {
            warn!(shop = %shop, expected = %pending.shop, "OAuth shop mismatch");
            return Err(OAuthError::ShopMismatch);
        }

        let message = signed_message(params);
        if !signature::verify_query(
            pending.client_secret.expose_secret().as_bytes(),
            &message,
            hmac,
        ) {
            warn!(shop = %shop, "OAuth callback HMAC mismatch");
            return Err(OAuthError::InvalidHmac);
        }

        let token = self
            .client
            .exchange_code(&shop, &pending.client_id, &pending.client_secret, code)
            .await?;

        let handoff_key = self
            .handoffs
            .insert_random(HandoffToken {
                access_token: SecretString::from(token.access_token),
                client_id: pending.client_id.clone(),
                client_secret: pending.client_secret.clone(),
            })
            .await;

        let integration_code = derive_integration_code(&pending.name, Utc::now().timestamp());
        let redirect_url = self.frontend_redirect(&[
            ("shop", shop.as_str()),
            ("name", pending.name.as_str()),
            ("code", integration_code.as_str()),
            ("state", state),
            ("user_id", &pending.initiator.user_id.to_string()),
            ("business_id", &pending.initiator.business_id.to_string()),
        ]);

        info!(shop = %shop, scope = %token.scope, "OAuth authorization completed");
        Ok(CallbackOutcome {
            redirect_url,
            handoff_key,
        })
    }

    /// Collect parked credentials. Works once per key.
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::TokenNotFound` for unknown, used or expired keys.
    pub async fn retrieve_token(&self, key: &str) -> Result<HandoffToken, OAuthError> {
        self.handoffs
            .take(key)
            .await
            .ok_or(OAuthError::TokenNotFound)
    }

    /// `Set-Cookie` value delivering a handoff key.
    #[must_use]
    pub fn handoff_cookie(&self, key: &str) -> String {
        self.cookie(key, self.handoffs.ttl().as_secs())
    }

    /// `Set-Cookie` value clearing the handoff cookie.
    #[must_use]
    pub fn clear_handoff_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: u64) -> String {
        let secure = if self.secure_cookies { "; Secure" } else { "" };
        format!("{HANDOFF_COOKIE}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax{secure}")
    }

    fn frontend_redirect(&self, params: &[(&str, &str)]) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        format!("{}/integrations/shopify/callback?{query}", self.frontend_url)
    }
}

fn required<'a>(
    params: &'a BTreeMap<String, String>,
    key: &'static str,
) -> Result<&'a str, OAuthError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or(OAuthError::MissingParameter(key))
}

/// The message the storefront signs: every query parameter except `hmac`
/// and `signature`, sorted by key and form-encoded.
#[must_use]
pub fn signed_message(params: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(
            params
                .iter()
                .filter(|(k, _)| k.as_str() != "hmac" && k.as_str() != "signature"),
        )
        .finish()
}

fn authorization_url(
    shop: &str,
    client_id: &str,
    scopes: &str,
    redirect_uri: &str,
) -> Result<String, OAuthError> {
    let url = Url::parse_with_params(
        &format!("https://{shop}/admin/oauth/authorize"),
        &[
            ("client_id", client_id),
            ("scope", scopes),
            ("redirect_uri", redirect_uri),
        ],
    )
    .map_err(|_| OAuthError::MissingParameter("shop"))?;
    Ok(url.into())
}
