//! Verification and asynchronous dispatch of webhook deliveries.

use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use storelink_core::INTEGRATION_TYPE_SHOPIFY;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, instrument, warn};

use super::{WebhookDelivery, WebhookError, WebhookStage, signature};
use crate::orders::{OrderOwner, translate};
use crate::publisher::OrderPublisher;
use crate::registry::{CLIENT_SECRET_FIELD, IntegrationRegistry};

/// Verifies deliveries and hands them to the topic handlers.
pub struct WebhookPipeline {
    registry: Arc<IntegrationRegistry>,
    publisher: Arc<dyn OrderPublisher>,
    /// Process-wide secret used when a shop has none of its own.
    fallback_secret: Option<SecretString>,
}

impl WebhookPipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        registry: Arc<IntegrationRegistry>,
        publisher: Arc<dyn OrderPublisher>,
        fallback_secret: Option<SecretString>,
    ) -> Self {
        Self {
            registry,
            publisher,
            fallback_secret,
        }
    }

    /// Resolve the signing secret for a shop.
    ///
    /// The shop's own `client_secret` wins. Order topics may fall back to the
    /// process-wide secret; compliance topics may not.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::MissingSecret` when nothing can be resolved.
    pub async fn resolve_secret(
        &self,
        shop_domain: &str,
        allow_fallback: bool,
    ) -> Result<SecretString, WebhookError> {
        let per_shop = match self
            .registry
            .get_by_external_id(shop_domain, INTEGRATION_TYPE_SHOPIFY)
            .await
        {
            Ok(integration) => self
                .registry
                .decrypt_credential(integration.id, CLIENT_SECRET_FIELD)
                .await
                .map_err(|e| {
                    warn!(shop = %shop_domain, error = %e, "No per-shop webhook secret");
                })
                .ok(),
            Err(e) => {
                warn!(shop = %shop_domain, error = %e, "Webhook for unknown shop");
                None
            }
        };

        per_shop
            .or_else(|| {
                allow_fallback
                    .then(|| self.fallback_secret.clone())
                    .flatten()
            })
            .ok_or_else(|| WebhookError::MissingSecret(shop_domain.to_string()))
    }

    /// Check the delivery's HMAC and move it to `verified`.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::MissingSecret` or
    /// `WebhookError::InvalidSignature`; either means `401`.
    #[instrument(skip(self, delivery), fields(topic = %delivery.topic, shop = %delivery.shop_domain))]
    pub async fn verify(&self, delivery: &mut WebhookDelivery) -> Result<(), WebhookError> {
        let allow_fallback = delivery.topic.is_order();
        let secret = self
            .resolve_secret(&delivery.shop_domain, allow_fallback)
            .await?;

        if !signature::verify_webhook(
            secret.expose_secret().as_bytes(),
            &delivery.body,
            &delivery.hmac,
        ) {
            warn!("Webhook HMAC mismatch");
            return Err(WebhookError::InvalidSignature);
        }

        delivery.advance(WebhookStage::Verified)
    }

    /// Schedule processing of an acknowledged delivery on a detached task.
    ///
    /// The task does not inherit the request's cancellation; dropping the
    /// returned handle does not stop it.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::IllegalTransition` if the delivery was not
    /// acknowledged first. Nothing is spawned in that case.
    pub fn dispatch(
        self: &Arc<Self>,
        mut delivery: WebhookDelivery,
    ) -> Result<JoinHandle<WebhookStage>, WebhookError> {
        delivery.advance(WebhookStage::Dispatched)?;

        let pipeline = Arc::clone(self);
        let span = tracing::info_span!(
            "webhook_dispatch",
            topic = %delivery.topic,
            shop = %delivery.shop_domain
        );

        Ok(tokio::spawn(
            async move {
                let outcome = pipeline.process(&delivery).await;
                let next = match outcome {
                    Ok(()) => WebhookStage::Processed,
                    Err(e) => {
                        tracing::error!(error = %e, "Webhook processing failed");
                        WebhookStage::Failed
                    }
                };
                if let Err(e) = delivery.advance(next) {
                    warn!(error = %e, "Webhook stage not recorded");
                }
                delivery.stage
            }
            .instrument(span),
        ))
    }

    /// Run the topic handler for a delivery.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the resolve-map-publish chain.
    pub async fn process(&self, delivery: &WebhookDelivery) -> Result<(), WebhookError> {
        if delivery.topic.is_compliance() {
            // Compliance requests are acknowledged and logged only.
            info!(
                topic = %delivery.topic,
                shop = %delivery.shop_domain,
                bytes = delivery.body.len(),
                "Compliance webhook received"
            );
            return Ok(());
        }

        let integration = self
            .registry
            .get_by_external_id(&delivery.shop_domain, INTEGRATION_TYPE_SHOPIFY)
            .await?;
        let owner = OrderOwner {
            integration_id: integration.id,
            business_id: integration.business_id,
        };

        let order = translate(&delivery.body, &owner, Utc::now())?;
        self.publisher.publish(&order).await?;

        info!(
            integration_id = %integration.id,
            external_id = %order.external_id,
            status = order.status.code(),
            "Order webhook published"
        );
        Ok(())
    }
}
