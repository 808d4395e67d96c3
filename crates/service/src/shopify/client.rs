//! Storefront admin REST client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::LINK;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use storelink_core::normalize_shop_domain;
use tracing::instrument;

use super::types::{
    AccessTokenResponse, OrderEnvelope, OrderQuery, OrdersEnvelope, OrdersPage, ShopEnvelope,
    ShopInfo, ShopifyOrder, WebhookEnvelope, WebhookInfo, WebhooksEnvelope,
};
use super::{ShopifyError, WebhookTopic};

/// Pinned admin API version.
pub const API_VERSION: &str = "2024-10";

/// Page size used when none (or a non-positive one) is requested.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page the storefront will return.
pub const MAX_PAGE_SIZE: i64 = 250;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Storefront admin REST client.
///
/// Cheap to clone. Every call takes the shop and token explicitly, so one
/// client serves all connected shops.
#[derive(Clone)]
pub struct ShopifyRestClient {
    inner: Arc<ShopifyRestClientInner>,
}

struct ShopifyRestClientInner {
    http: reqwest::Client,
    debug: bool,
    /// Replaces `https://{shop}` as the origin of every request.
    base_url_override: Option<String>,
}

impl ShopifyRestClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::Http` if the HTTP client cannot be built.
    pub fn new(debug: bool) -> Result<Self, ShopifyError> {
        Self::build(debug, None)
    }

    /// Create a client that sends every request to `base_url` instead of the
    /// shop's own domain. Used against mock servers.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::Http` if the HTTP client cannot be built.
    pub fn with_base_url(base_url: &str, debug: bool) -> Result<Self, ShopifyError> {
        Self::build(debug, Some(base_url.trim_end_matches('/').to_string()))
    }

    fn build(debug: bool, base_url_override: Option<String>) -> Result<Self, ShopifyError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(ShopifyRestClientInner {
                http,
                debug,
                base_url_override,
            }),
        })
    }

    fn origin(&self, shop: &str) -> String {
        self.inner
            .base_url_override
            .clone()
            .unwrap_or_else(|| format!("https://{}", normalize_shop_domain(shop)))
    }

    fn api_url(&self, shop: &str, path: &str) -> String {
        format!("{}/admin/api/{API_VERSION}/{path}", self.origin(shop))
    }

    // =========================================================================
    // Shop
    // =========================================================================

    /// Validate an access token by fetching the shop resource.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` on 401
    /// - `InsufficientScope` on 403
    /// - `ShopNotFound` on 404
    /// - `RateLimited` on 429
    /// - `Transport` on any other non-2xx
    #[instrument(skip(self, token))]
    pub async fn validate_token(
        &self,
        shop: &str,
        token: &SecretString,
    ) -> Result<ShopInfo, ShopifyError> {
        let url = self.api_url(shop, "shop.json");
        let response = self.send(self.request(Method::GET, &url, token)).await?;
        let response = self
            .check(response, || ShopifyError::ShopNotFound(normalize_shop_domain(shop)))
            .await?;
        let envelope: ShopEnvelope = self.read_json(response).await?;
        Ok(envelope.shop)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Fetch the first page of orders.
    ///
    /// # Errors
    ///
    /// Returns a typed `ShopifyError` for non-2xx responses or bad JSON.
    #[instrument(skip(self, token, query))]
    pub async fn get_orders(
        &self,
        shop: &str,
        token: &SecretString,
        query: &OrderQuery,
    ) -> Result<OrdersPage, ShopifyError> {
        let url = self.api_url(shop, "orders.json");
        let builder = self
            .request(Method::GET, &url, token)
            .query(&order_query_pairs(query));
        self.fetch_orders_page(builder, shop).await
    }

    /// Fetch a continuation page by the URL taken from the `Link` header.
    ///
    /// # Errors
    ///
    /// Returns a typed `ShopifyError` for non-2xx responses or bad JSON.
    #[instrument(skip(self, token))]
    pub async fn get_orders_by_url(
        &self,
        next_page_url: &str,
        token: &SecretString,
    ) -> Result<OrdersPage, ShopifyError> {
        let builder = self.request(Method::GET, next_page_url, token);
        self.fetch_orders_page(builder, next_page_url).await
    }

    async fn fetch_orders_page(
        &self,
        builder: RequestBuilder,
        context: &str,
    ) -> Result<OrdersPage, ShopifyError> {
        let response = self.send(builder).await?;
        let response = self
            .check(response, || ShopifyError::ShopNotFound(context.to_string()))
            .await?;

        let next_page_url = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_next_link);

        let envelope: OrdersEnvelope = self.read_json(response).await?;

        Ok(OrdersPage {
            orders: envelope.orders,
            next_page_url,
        })
    }

    /// Fetch a single order.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::NotFound` if the order does not exist.
    #[instrument(skip(self, token))]
    pub async fn get_order(
        &self,
        shop: &str,
        token: &SecretString,
        order_id: i64,
    ) -> Result<ShopifyOrder, ShopifyError> {
        let url = self.api_url(shop, &format!("orders/{order_id}.json"));
        let response = self.send(self.request(Method::GET, &url, token)).await?;
        let response = self
            .check(response, || ShopifyError::NotFound(format!("order {order_id}")))
            .await?;
        let envelope: OrderEnvelope = self.read_json(response).await?;
        Ok(envelope.order)
    }

    // =========================================================================
    // Webhooks
    // =========================================================================

    /// List webhook subscriptions registered on the shop.
    ///
    /// # Errors
    ///
    /// Returns a typed `ShopifyError` for non-2xx responses or bad JSON.
    #[instrument(skip(self, token))]
    pub async fn list_webhooks(
        &self,
        shop: &str,
        token: &SecretString,
    ) -> Result<Vec<WebhookInfo>, ShopifyError> {
        let url = self.api_url(shop, "webhooks.json");
        let response = self.send(self.request(Method::GET, &url, token)).await?;
        let response = self
            .check(response, || ShopifyError::ShopNotFound(normalize_shop_domain(shop)))
            .await?;
        let envelope: WebhooksEnvelope = self.read_json(response).await?;
        Ok(envelope.webhooks)
    }

    /// Register a webhook subscription and return its ID.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::InvalidTopic` if `topic` is not an order topic,
    /// or a typed error for the HTTP call.
    #[instrument(skip(self, token))]
    pub async fn create_webhook(
        &self,
        shop: &str,
        token: &SecretString,
        callback_url: &str,
        topic: &str,
    ) -> Result<i64, ShopifyError> {
        let topic = WebhookTopic::subscribable(topic)?;
        let url = self.api_url(shop, "webhooks.json");
        let body = json!({
            "webhook": {
                "topic": topic.as_str(),
                "address": callback_url,
                "format": "json",
            }
        });

        let response = self
            .send(self.request(Method::POST, &url, token).json(&body))
            .await?;
        let response = self
            .check(response, || ShopifyError::ShopNotFound(normalize_shop_domain(shop)))
            .await?;
        let envelope: WebhookEnvelope = self.read_json(response).await?;
        Ok(envelope.webhook.id)
    }

    /// Delete a webhook subscription.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::NotFound` if the subscription does not exist.
    #[instrument(skip(self, token))]
    pub async fn delete_webhook(
        &self,
        shop: &str,
        token: &SecretString,
        webhook_id: i64,
    ) -> Result<(), ShopifyError> {
        let url = self.api_url(shop, &format!("webhooks/{webhook_id}.json"));
        let response = self.send(self.request(Method::DELETE, &url, token)).await?;
        self.check(response, || ShopifyError::NotFound(format!("webhook {webhook_id}")))
            .await?;
        Ok(())
    }

    // =========================================================================
    // OAuth
    // =========================================================================

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::OAuth` if the storefront rejects the exchange.
    #[instrument(skip(self, client_secret, code))]
    pub async fn exchange_code(
        &self,
        shop: &str,
        client_id: &str,
        client_secret: &SecretString,
        code: &str,
    ) -> Result<AccessTokenResponse, ShopifyError> {
        let url = format!("{}/admin/oauth/access_token", self.origin(shop));
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret()),
            ("code", code),
        ];

        let response = self
            .send(self.inner.http.post(&url).form(&params))
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ShopifyError::OAuth(format!(
                "token exchange failed with HTTP {}: {text}",
                status.as_u16()
            )));
        }

        let token: AccessTokenResponse = self.read_json(response).await?;
        if token.access_token.is_empty() {
            return Err(ShopifyError::OAuth(
                "token exchange returned an empty access token".to_string(),
            ));
        }
        Ok(token)
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn request(&self, method: Method, url: &str, token: &SecretString) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .header(ACCESS_TOKEN_HEADER, token.expose_secret())
            .header("Accept", "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ShopifyError> {
        let request = builder.build()?;
        if self.inner.debug {
            tracing::debug!(method = %request.method(), url = %request.url(), "storefront request");
        }
        let response = self.inner.http.execute(request).await?;
        if self.inner.debug {
            tracing::debug!(
                status = response.status().as_u16(),
                url = %response.url(),
                "storefront response"
            );
        }
        Ok(response)
    }

    /// Map non-2xx responses onto typed errors.
    async fn check(
        &self,
        response: Response,
        not_found: impl FnOnce() -> ShopifyError,
    ) -> Result<Response, ShopifyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if self.inner.debug {
            tracing::debug!(status = status.as_u16(), %body, "storefront error body");
        }

        Err(match status {
            StatusCode::UNAUTHORIZED => ShopifyError::InvalidToken,
            StatusCode::FORBIDDEN => ShopifyError::InsufficientScope,
            StatusCode::NOT_FOUND => not_found(),
            StatusCode::TOO_MANY_REQUESTS => ShopifyError::RateLimited,
            _ => ShopifyError::Transport {
                status: status.as_u16(),
                body,
            },
        })
    }

    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T, ShopifyError> {
        let bytes = response.bytes().await?;
        if self.inner.debug {
            tracing::debug!(body = %String::from_utf8_lossy(&bytes), "storefront response body");
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Clamp a requested page size into the storefront's accepted range.
#[must_use]
pub const fn effective_page_size(requested: Option<i64>) -> i64 {
    match requested {
        Some(n) if n > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        Some(n) if n > 0 => n,
        _ => DEFAULT_PAGE_SIZE,
    }
}

fn order_query_pairs(query: &OrderQuery) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        (
            "status",
            query.status.clone().unwrap_or_else(|| "any".to_string()),
        ),
        ("limit", effective_page_size(query.limit).to_string()),
    ];

    let timestamps = [
        ("created_at_min", query.created_at_min),
        ("created_at_max", query.created_at_max),
        ("updated_at_min", query.updated_at_min),
        ("updated_at_max", query.updated_at_max),
        ("processed_at_min", query.processed_at_min),
        ("processed_at_max", query.processed_at_max),
    ];
    for (key, value) in timestamps {
        if let Some(ts) = value {
            pairs.push((key, ts.to_rfc3339()));
        }
    }

    if let Some(v) = query.financial_status.as_ref().filter(|v| !v.is_empty()) {
        pairs.push(("financial_status", v.clone()));
    }
    if let Some(v) = query.fulfillment_status.as_ref().filter(|v| !v.is_empty()) {
        pairs.push(("fulfillment_status", v.clone()));
    }
    if let Some(v) = query.since_id {
        pairs.push(("since_id", v.to_string()));
    }
    if let Some(v) = query.fields.as_ref().filter(|v| !v.is_empty()) {
        pairs.push(("fields", v.clone()));
    }

    pairs
}

/// Extract the `rel="next"` URL from a `Link` header.
#[must_use]
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let url = segments.next()?.trim();
        let is_next = segments.any(|s| {
            let s = s.trim().replace(' ', "");
            s == "rel=\"next\"" || s == "rel=next"
        });
        if !is_next {
            return None;
        }
        url.strip_prefix('<')
            .and_then(|u| u.strip_suffix('>'))
            .filter(|u| !u.is_empty())
            .map(ToString::to_string)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_next_link() {
        let header = r#"<https://demo.myshopify.com/admin/api/2024-10/orders.json?page_info=abc&limit=250>; rel="next""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://demo.myshopify.com/admin/api/2024-10/orders.json?page_info=abc&limit=250")
        );
    }

    #[test]
    fn test_parse_next_link_with_previous() {
        let header = r#"<https://x/orders.json?page_info=prev>; rel="previous", <https://x/orders.json?page_info=next>; rel="next""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://x/orders.json?page_info=next")
        );
    }

    #[test]
    fn test_parse_next_link_exhausted() {
        let header = r#"<https://x/orders.json?page_info=prev>; rel="previous""#;
        assert!(parse_next_link(header).is_none());
        assert!(parse_next_link("").is_none());
    }

    #[test]
    fn test_effective_page_size() {
        assert_eq!(effective_page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(Some(0)), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(Some(-5)), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(Some(10)), 10);
        assert_eq!(effective_page_size(Some(250)), 250);
        assert_eq!(effective_page_size(Some(1000)), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_order_query_pairs() {
        let query = OrderQuery {
            limit: Some(500),
            created_at_min: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            financial_status: Some("paid".to_string()),
            fulfillment_status: Some(String::new()),
            ..Default::default()
        };
        let pairs = order_query_pairs(&query);

        assert!(pairs.contains(&("status", "any".to_string())));
        assert!(pairs.contains(&("limit", "250".to_string())));
        assert!(pairs.contains(&("created_at_min", "2024-01-01T00:00:00+00:00".to_string())));
        assert!(pairs.contains(&("financial_status", "paid".to_string())));
        assert!(!pairs.iter().any(|(k, _)| *k == "fulfillment_status"));
    }

    #[test]
    fn test_api_url_normalizes_shop() {
        let client = ShopifyRestClient::new(false).unwrap();
        assert_eq!(
            client.api_url("demo", "shop.json"),
            "https://demo.myshopify.com/admin/api/2024-10/shop.json"
        );

        let mocked = ShopifyRestClient::with_base_url("http://127.0.0.1:9999/", false).unwrap();
        assert_eq!(
            mocked.api_url("demo", "orders.json"),
            "http://127.0.0.1:9999/admin/api/2024-10/orders.json"
        );
    }

    // =========================================================================
    // HTTP behaviour
    // =========================================================================

    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SHOP: &str = "demo.myshopify.com";

    fn token() -> SecretString {
        SecretString::from("shpat_test")
    }

    async fn mocked() -> (MockServer, ShopifyRestClient) {
        let server = MockServer::start().await;
        let client = ShopifyRestClient::with_base_url(&server.uri(), false).unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_validate_token_maps_status_codes() {
        for (status, code) in [
            (401, "invalid_token"),
            (403, "insufficient_scope"),
            (404, "shop_not_found"),
            (429, "rate_limited"),
            (500, "transport_error"),
        ] {
            let (server, client) = mocked().await;
            Mock::given(method("GET"))
                .and(path("/admin/api/2024-10/shop.json"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;

            let err = client.validate_token("demo", &token()).await.unwrap_err();
            assert_eq!(err.code(), code, "HTTP {status}");
        }
    }

    #[tokio::test]
    async fn test_validate_token_sends_access_token() {
        let (server, client) = mocked().await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-10/shop.json"))
            .and(header("X-Shopify-Access-Token", "shpat_test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"shop": {"id": 9, "name": "Demo"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let shop = client.validate_token(SHOP, &token()).await.unwrap();
        assert_eq!(shop.id, 9);
        assert_eq!(shop.name, "Demo");
    }

    #[tokio::test]
    async fn test_get_orders_reads_next_link() {
        let (server, client) = mocked().await;
        let next = format!("{}/admin/api/2024-10/orders.json?page_info=p2", server.uri());
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-10/orders.json"))
            .and(query_param("status", "any"))
            .and(query_param("limit", "250"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", format!("<{next}>; rel=\"next\"").as_str())
                    .set_body_json(json!({"orders": [{"id": 1}, {"id": 2}]})),
            )
            .mount(&server)
            .await;

        let page = client
            .get_orders(
                SHOP,
                &token(),
                &OrderQuery {
                    limit: Some(1000),
                    ..OrderQuery::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.orders.len(), 2);
        assert_eq!(page.next_page_url.as_deref(), Some(next.as_str()));
    }

    #[tokio::test]
    async fn test_get_order_not_found() {
        let (server, client) = mocked().await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-10/orders/77.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-10/orders/78.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "order": {"id": 78, "financial_status": "paid", "total_price": "12.50"}
            })))
            .mount(&server)
            .await;

        let missing = client.get_order(SHOP, &token(), 77).await.unwrap_err();
        assert!(matches!(missing, ShopifyError::NotFound(_)));

        let order = client.get_order(SHOP, &token(), 78).await.unwrap();
        assert_eq!(order.id, 78);
    }

    #[tokio::test]
    async fn test_create_webhook_rejects_unknown_topic_without_calling() {
        let (server, client) = mocked().await;

        let err = client
            .create_webhook(SHOP, &token(), "https://hooks.example.com/x", "products/create")
            .await
            .unwrap_err();

        assert!(matches!(err, ShopifyError::InvalidTopic(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let (server, client) = mocked().await;
        Mock::given(method("POST"))
            .and(path("/admin/oauth/access_token"))
            .and(wiremock::matchers::body_string_contains("code=abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "shpat_x", "scope": "read_orders"})),
            )
            .mount(&server)
            .await;

        let token = client
            .exchange_code(SHOP, "client", &SecretString::from("secret"), "abc")
            .await
            .unwrap();
        assert_eq!(token.access_token, "shpat_x");
        assert_eq!(token.scope, "read_orders");
    }
}
