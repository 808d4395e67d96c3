//! Storelink - Storefront integration service.
//!
//! # Architecture
//!
//! - Axum web framework
//! - `PostgreSQL` for integrations and notification rules
//! - Redis for the notification-routing cache
//! - `RabbitMQ` for canonical orders and sync lifecycle events
//! - Storefront Admin REST API for orders, webhooks and OAuth
//!
//! Migrations are not run on startup. Run them with `storelink-cli migrate`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storelink_service::config::ServiceConfig;
use storelink_service::db;
use storelink_service::notifications::{PgNotificationRepository, RedisKvStore};
use storelink_service::publisher::{AmqpPublisher, NoopPublisher, OrderPublisher, SyncEventPublisher};
use storelink_service::registry::PgIntegrationStore;
use storelink_service::shopify::ShopifyRestClient;
use storelink_service::state::{AppState, Backends};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServiceConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            // Order payloads carry customer addresses
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServiceConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storelink_service=info,tower_http=info".into());

    let json_layer = config
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!config.log_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    let kv = RedisKvStore::connect(&config.redis_url)
        .await
        .expect("Failed to connect to Redis");
    tracing::info!("Redis connected");

    let (orders, events): (Arc<dyn OrderPublisher>, Arc<dyn SyncEventPublisher>) =
        match &config.amqp_url {
            Some(url) => match AmqpPublisher::connect(url, &config.amqp_exchange).await {
                Ok(publisher) => {
                    let publisher = Arc::new(publisher);
                    tracing::info!(exchange = %config.amqp_exchange, "Message bus connected");
                    (publisher.clone(), publisher)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Message bus unavailable, orders will not be published");
                    (Arc::new(NoopPublisher), Arc::new(NoopPublisher))
                }
            },
            None => {
                tracing::warn!("AMQP_URL not set, orders will not be published");
                (Arc::new(NoopPublisher), Arc::new(NoopPublisher))
            }
        };

    let shopify =
        ShopifyRestClient::new(config.shopify.debug).expect("Failed to build storefront client");

    let backends = Backends::new(
        Arc::new(PgIntegrationStore::new(
            pool.clone(),
            config.credentials_key.clone(),
        )),
        Arc::new(PgNotificationRepository::new(pool)),
        Arc::new(kv),
        orders,
        events,
        shopify,
    );
    let state = AppState::new(config.clone(), backends).await;

    match state.notifications().cache().warmup().await {
        Ok(report) => tracing::info!(
            cached = report.cached,
            failed = report.failed,
            "Notification cache warmed up"
        ),
        Err(e) => tracing::error!(error = %e, "Notification cache warmup failed"),
    }

    let app = storelink_service::build_router(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("storelink listening on http://{}{}", addr, config.route_prefix);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
