//! Storefront integration management routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use storelink_core::{
    INTEGRATION_TYPE_SHOPIFY, Integration, IntegrationConfig, IntegrationId,
    normalize_shop_domain,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CallerIdentity;
use crate::registry::{ACCESS_TOKEN_FIELD, CLIENT_ID_FIELD, CLIENT_SECRET_FIELD, NewIntegration};
use crate::shopify::WebhookInfo;
use crate::state::AppState;
use crate::subscriptions::SubscriptionReport;
use crate::sync::SyncParams;

/// Build the integration router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/integrations/shopify", post(finalize))
        .route("/integrations/shopify/{id}", delete(revoke))
        .route(
            "/integrations/shopify/{id}/webhooks",
            get(list_webhooks).post(create_webhooks),
        )
        .route(
            "/integrations/shopify/{id}/webhooks/{webhook_id}",
            delete(delete_webhook),
        )
        .route("/integrations/shopify/{id}/sync", post(start_sync))
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Deserialize)]
pub struct FinalizeRequest {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    pub shop: String,
    pub access_token: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IntegrationResponse {
    pub id: IntegrationId,
    pub name: String,
    pub code: Option<String>,
    pub shop: String,
    pub shop_name: String,
    pub config: IntegrationConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateWebhooksRequest {
    /// Overrides the configured public base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncStarted {
    pub sync_id: Uuid,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /integrations/shopify - Persist an authorized shop.
///
/// The token is validated against the storefront first. Creation fires the
/// type observers, which subscribe the shop to order webhooks.
#[instrument(skip_all)]
async fn finalize(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<FinalizeRequest>,
) -> Result<(StatusCode, Json<IntegrationResponse>), AppError> {
    let name = body.name.trim();
    let shop = normalize_shop_domain(&body.shop);
    if name.is_empty() || shop.is_empty() || body.access_token.trim().is_empty() {
        return Err(AppError::BadRequest(
            "name, shop and access_token are required".to_string(),
        ));
    }

    let token = SecretString::from(body.access_token.trim().to_string());
    let shop_info = state.shopify().validate_token(&shop, &token).await?;

    let mut credentials = vec![(ACCESS_TOKEN_FIELD.to_string(), token)];
    let app = &state.config().shopify;
    let client_id = body
        .client_id
        .filter(|v| !v.trim().is_empty())
        .or_else(|| app.client_id.clone());
    let client_secret = body
        .client_secret
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
        .or_else(|| app.client_secret.clone());
    if let Some(client_id) = client_id {
        credentials.push((CLIENT_ID_FIELD.to_string(), SecretString::from(client_id)));
    }
    if let Some(client_secret) = client_secret {
        credentials.push((CLIENT_SECRET_FIELD.to_string(), client_secret));
    }

    let integration = state
        .registry()
        .create(NewIntegration {
            business_id: Some(caller.business_id),
            name: name.to_string(),
            code: body.code.filter(|c| !c.trim().is_empty()),
            integration_type: INTEGRATION_TYPE_SHOPIFY.to_string(),
            external_id: shop.clone(),
            config: IntegrationConfig {
                store_name: Some(shop.clone()),
                store_url: Some(format!("https://{shop}")),
                ..IntegrationConfig::default()
            },
            credentials,
        })
        .await?;

    info!(integration_id = %integration.id, shop = %shop, "Storefront integration finalized");
    Ok((
        StatusCode::CREATED,
        Json(IntegrationResponse {
            id: integration.id,
            name: integration.name,
            code: integration.code,
            shop,
            shop_name: shop_info.name,
            config: integration.config,
        }),
    ))
}

/// DELETE /integrations/shopify/{id} - Revoke an integration.
///
/// Removes its storefront webhooks, soft-deletes it and drops its cached
/// notification rules.
#[instrument(skip_all)]
async fn revoke(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<IntegrationId>,
) -> Result<StatusCode, AppError> {
    owned_integration(&state, caller, id).await?;
    state.registry().revoke(id).await?;

    if let Err(e) = state.notifications().cache().invalidate_integration(id).await {
        warn!(integration_id = %id, error = %e, "Failed to invalidate notification cache");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /integrations/shopify/{id}/webhooks - Subscriptions at the storefront.
async fn list_webhooks(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<IntegrationId>,
) -> Result<Json<Vec<WebhookInfo>>, AppError> {
    owned_integration(&state, caller, id).await?;
    Ok(Json(state.subscriptions().list_webhooks(id).await?))
}

/// POST /integrations/shopify/{id}/webhooks - Subscribe to every order topic.
#[instrument(skip_all)]
async fn create_webhooks(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<IntegrationId>,
    Json(body): Json<CreateWebhooksRequest>,
) -> Result<Json<SubscriptionReport>, AppError> {
    owned_integration(&state, caller, id).await?;

    let base_url = body
        .base_url
        .filter(|u| !u.trim().is_empty())
        .or_else(|| state.config().webhook_base_url.clone())
        .ok_or_else(|| AppError::BadRequest("WEBHOOK_BASE_URL is not configured".to_string()))?;

    Ok(Json(
        state.subscriptions().create_webhooks(id, &base_url).await?,
    ))
}

/// DELETE /integrations/shopify/{id}/webhooks/{webhook_id} - Remove one
/// subscription.
#[instrument(skip_all)]
async fn delete_webhook(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((id, webhook_id)): Path<(IntegrationId, i64)>,
) -> Result<Json<IntegrationConfig>, AppError> {
    owned_integration(&state, caller, id).await?;
    Ok(Json(
        state.subscriptions().delete_webhook(id, webhook_id).await?,
    ))
}

/// POST /integrations/shopify/{id}/sync - Start a bulk order sync.
///
/// Returns as soon as the run is announced; the run itself is detached.
#[instrument(skip_all)]
async fn start_sync(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<IntegrationId>,
    Json(params): Json<SyncParams>,
) -> Result<impl IntoResponse, AppError> {
    owned_integration(&state, caller, id).await?;
    let ticket = state.sync().start(id, &params).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncStarted {
            sync_id: ticket.sync_id,
        }),
    ))
}

// =============================================================================
// Helpers
// =============================================================================

/// Resolve an integration of the caller's business.
///
/// Integrations of other businesses are reported as missing.
async fn owned_integration(
    state: &AppState,
    caller: CallerIdentity,
    id: IntegrationId,
) -> Result<Integration, AppError> {
    let integration = state.registry().get_by_id(id).await?;
    if integration.business_id != Some(caller.business_id) {
        return Err(AppError::NotFound(format!("integration not found: {id}")));
    }
    if integration.integration_type != INTEGRATION_TYPE_SHOPIFY {
        return Err(AppError::BadRequest(format!(
            "integration {id} is not a storefront integration"
        )));
    }
    Ok(integration)
}
