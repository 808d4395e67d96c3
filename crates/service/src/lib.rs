//! Storelink service library.
//!
//! Connects storefront shops to the order bus: OAuth onboarding, webhook
//! ingestion and verification, bulk order sync, webhook subscription
//! management and the notification-routing cache.
//!
//! The binary in `main.rs` wires the `PostgreSQL`, Redis and `RabbitMQ`
//! adapters; tests assemble the same router over in-memory adapters.

#![cfg_attr(not(test), forbid(unsafe_code))]

use axum::Router;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod oauth;
pub mod orders;
pub mod publisher;
pub mod registry;
pub mod routes;
pub mod shopify;
pub mod state;
pub mod subscriptions;
pub mod sync;
pub mod webhooks;

use state::AppState;

/// Build the HTTP application.
///
/// Routes are mounted under the configured prefix when one is set. Sentry
/// layers are added by the binary.
pub fn build_router(state: AppState) -> Router {
    let prefix = state.config().route_prefix.clone();
    let routes = if prefix.is_empty() {
        routes::routes()
    } else {
        Router::new().nest(&prefix, routes::routes())
    };

    routes
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}
