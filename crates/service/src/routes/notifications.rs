//! Notification-config routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use storelink_core::{
    CachedRule, EventTypeId, IntegrationId, NotificationConfigId, NotificationRule,
    NotificationTypeId, OrderStatusId, RuleSubject,
};
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::CallerIdentity;
use crate::notifications::{NewRule, RuleInput, RulePatch, SyncSummary};
use crate::state::AppState;

/// Build the notification-config router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notification-configs", get(list).post(create))
        .route("/notification-configs/sync", put(sync))
        .route("/notification-configs/lookup", get(lookup))
        .route(
            "/notification-configs/{id}",
            get(show).patch(update).delete(remove),
        )
        .route("/notification-configs/{id}/evaluate", post(evaluate))
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub integration_id: Option<IntegrationId>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub integration_id: IntegrationId,
    pub notification_type_id: NotificationTypeId,
    pub event_type_id: EventTypeId,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order_status_ids: Vec<OrderStatusId>,
    #[serde(default)]
    pub payment_methods: Vec<String>,
}

const fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub integration_id: IntegrationId,
    pub rules: Vec<RuleInput>,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub integration_id: IntegrationId,
    pub event_code: Option<String>,
    pub notification_type_id: Option<NotificationTypeId>,
    pub event_type_id: Option<EventTypeId>,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub matches: bool,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// GET /notification-configs - Rules of the caller's business.
async fn list(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<NotificationRule>>, AppError> {
    Ok(Json(
        state
            .notifications()
            .list(caller.business_id, query.integration_id)
            .await?,
    ))
}

/// POST /notification-configs - Create a rule.
#[instrument(skip_all)]
async fn create(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<NotificationRule>), AppError> {
    ensure_integration(&state, caller, body.integration_id).await?;

    let rule = state
        .notifications()
        .create(NewRule {
            business_id: caller.business_id,
            integration_id: body.integration_id,
            notification_type_id: body.notification_type_id,
            event_type_id: body.event_type_id,
            enabled: body.enabled,
            description: body.description,
            order_status_ids: body.order_status_ids,
            payment_methods: body.payment_methods,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /notification-configs/{id}
async fn show(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<NotificationConfigId>,
) -> Result<Json<NotificationRule>, AppError> {
    Ok(Json(state.notifications().get(caller.business_id, id).await?))
}

/// PATCH /notification-configs/{id} - Partial update.
#[instrument(skip_all)]
async fn update(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<NotificationConfigId>,
    Json(patch): Json<RulePatch>,
) -> Result<Json<NotificationRule>, AppError> {
    Ok(Json(
        state
            .notifications()
            .update(caller.business_id, id, patch)
            .await?,
    ))
}

/// DELETE /notification-configs/{id}
#[instrument(skip_all)]
async fn remove(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<NotificationConfigId>,
) -> Result<StatusCode, AppError> {
    state.notifications().delete(caller.business_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /notification-configs/sync - Reconcile an integration's rules.
#[instrument(skip_all)]
async fn sync(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<SyncRequest>,
) -> Result<Json<SyncSummary>, AppError> {
    ensure_integration(&state, caller, body.integration_id).await?;
    Ok(Json(
        state
            .notifications()
            .sync(caller.business_id, body.integration_id, body.rules)
            .await?,
    ))
}

/// POST /notification-configs/{id}/evaluate - Check a rule against an order.
async fn evaluate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<NotificationConfigId>,
    Json(subject): Json<RuleSubject>,
) -> Result<Json<EvaluateResponse>, AppError> {
    let matches = state
        .notifications()
        .evaluate(caller.business_id, id, &subject)
        .await?;
    Ok(Json(EvaluateResponse { matches }))
}

/// GET /notification-configs/lookup - Enabled rules from the routing cache.
///
/// Takes either `event_code` or both `notification_type_id` and
/// `event_type_id`.
async fn lookup(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<LookupQuery>,
) -> Result<Json<Vec<CachedRule>>, AppError> {
    ensure_integration(&state, caller, query.integration_id).await?;

    let service = state.notifications();
    let rules = match (
        query.event_code.as_deref().filter(|c| !c.is_empty()),
        query.notification_type_id,
        query.event_type_id,
    ) {
        (Some(code), _, _) => service.lookup_by_event(query.integration_id, code).await?,
        (None, Some(type_id), Some(event_id)) => {
            service
                .lookup(query.integration_id, type_id, event_id)
                .await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "event_code or notification_type_id and event_type_id are required".to_string(),
            ));
        }
    };
    Ok(Json(rules))
}

// =============================================================================
// Helpers
// =============================================================================

/// Require the integration to belong to the caller's business.
async fn ensure_integration(
    state: &AppState,
    caller: CallerIdentity,
    id: IntegrationId,
) -> Result<(), AppError> {
    let integration = state.registry().get_by_id(id).await?;
    if integration.business_id == Some(caller.business_id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("integration not found: {id}")))
    }
}
