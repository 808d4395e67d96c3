//! Storefront webhook receivers.
//!
//! Handlers only verify and acknowledge. Processing is handed to the
//! pipeline's detached task after the acknowledgement is decided, so the
//! storefront's response deadline never waits on the bus.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::shopify::WebhookTopic;
use crate::state::AppState;
use crate::webhooks::{
    HEADER_HMAC, HEADER_SHOP_DOMAIN, HEADER_TOPIC, WebhookDelivery, WebhookError, WebhookStage,
};

/// Build the webhook router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/integrations/shopify/webhook", post(order_webhook))
        .route("/integrations/shopify/webhooks/compliance", post(compliance_webhook))
        .route(
            "/integrations/shopify/webhooks/customers/data_request",
            post(customers_data_request),
        )
        .route(
            "/integrations/shopify/webhooks/customers/redact",
            post(customers_redact),
        )
        .route("/integrations/shopify/webhooks/shop/redact", post(shop_redact))
}

/// Body of every webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: &'static str,
}

const RECEIVED: &str = "Recibido";
const INVALID_HMAC: &str = "Firma HMAC inválida";
const MISSING_HEADERS: &str = "Faltan encabezados requeridos";
const UNSUPPORTED_TOPIC: &str = "Tópico no soportado";
const EMPTY_PAYLOAD: &str = "Cuerpo vacío";

fn reply(status: StatusCode, message: &'static str) -> Response {
    (
        status,
        Json(WebhookAck {
            success: status.is_success(),
            message,
        }),
    )
        .into_response()
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /integrations/shopify/webhook - Order topics.
async fn order_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    receive(&state, &headers, body, None, WebhookTopic::is_order).await
}

/// POST /integrations/shopify/webhooks/compliance - Any privacy topic, named
/// by the topic header.
async fn compliance_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    receive(&state, &headers, body, None, WebhookTopic::is_compliance).await
}

/// POST /integrations/shopify/webhooks/customers/data_request
async fn customers_data_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let topic = Some(WebhookTopic::CustomersDataRequest);
    receive(&state, &headers, body, topic, WebhookTopic::is_compliance).await
}

/// POST /integrations/shopify/webhooks/customers/redact
async fn customers_redact(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let topic = Some(WebhookTopic::CustomersRedact);
    receive(&state, &headers, body, topic, WebhookTopic::is_compliance).await
}

/// POST /integrations/shopify/webhooks/shop/redact
async fn shop_redact(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let topic = Some(WebhookTopic::ShopRedact);
    receive(&state, &headers, body, topic, WebhookTopic::is_compliance).await
}

// =============================================================================
// Pipeline
// =============================================================================

/// Verify, acknowledge and dispatch one delivery.
///
/// `fixed_topic` overrides the topic header for per-topic endpoints.
/// `accepts` restricts which topics the endpoint takes.
async fn receive(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
    fixed_topic: Option<WebhookTopic>,
    accepts: fn(WebhookTopic) -> bool,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let Some(hmac) = header(HEADER_HMAC) else {
        warn!("Webhook without HMAC header");
        return reply(StatusCode::UNAUTHORIZED, INVALID_HMAC);
    };
    let Some(shop) = header(HEADER_SHOP_DOMAIN) else {
        return reply(StatusCode::BAD_REQUEST, MISSING_HEADERS);
    };
    let topic = match (fixed_topic, header(HEADER_TOPIC)) {
        (Some(topic), _) => topic,
        (None, Some(raw)) => match raw.parse::<WebhookTopic>() {
            Ok(topic) => topic,
            Err(_) => {
                warn!(topic = raw, shop, "Unsupported webhook topic");
                return reply(StatusCode::BAD_REQUEST, UNSUPPORTED_TOPIC);
            }
        },
        (None, None) => return reply(StatusCode::BAD_REQUEST, MISSING_HEADERS),
    };
    if !accepts(topic) {
        warn!(topic = %topic, shop, "Webhook topic sent to the wrong endpoint");
        return reply(StatusCode::BAD_REQUEST, UNSUPPORTED_TOPIC);
    }

    let mut delivery = match WebhookDelivery::new(topic, shop, hmac, body) {
        Ok(delivery) => delivery,
        Err(WebhookError::EmptyPayload) => return reply(StatusCode::BAD_REQUEST, EMPTY_PAYLOAD),
        Err(e) => {
            error!(error = %e, "Webhook delivery rejected");
            return reply(StatusCode::BAD_REQUEST, MISSING_HEADERS);
        }
    };

    if let Err(e) = state.pipeline().verify(&mut delivery).await {
        warn!(topic = %topic, shop = %delivery.shop_domain, error = %e, "Webhook verification failed");
        return reply(StatusCode::UNAUTHORIZED, INVALID_HMAC);
    }

    let response = reply(StatusCode::OK, RECEIVED);
    match delivery.advance(WebhookStage::Acknowledged) {
        Ok(()) => {
            if let Err(e) = state.pipeline().dispatch(delivery) {
                error!(error = %e, "Webhook dispatch failed");
            }
        }
        Err(e) => error!(error = %e, "Webhook not acknowledged"),
    }
    response
}
