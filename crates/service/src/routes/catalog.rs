//! Notification catalog routes: channels, events and order statuses.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
};
use serde::Deserialize;
use storelink_core::{
    EventTypeId, NotificationEventType, NotificationType, NotificationTypeId, OrderStatus,
};
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::CallerIdentity;
use crate::notifications::NewEventType;
use crate::state::AppState;

/// Build the catalog router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notification-types", get(list_types))
        .route(
            "/notification-event-types",
            get(list_event_types).post(create_event_type),
        )
        .route("/notification-event-types/{id}", delete(delete_event_type))
        .route("/order-statuses", get(list_order_statuses))
}

#[derive(Debug, Deserialize)]
pub struct EventTypeQuery {
    pub notification_type_id: Option<NotificationTypeId>,
}

/// GET /notification-types
async fn list_types(State(state): State<AppState>) -> Result<Json<Vec<NotificationType>>, AppError> {
    Ok(Json(state.notifications().list_types().await?))
}

/// GET /notification-event-types - Optionally narrowed to one channel.
async fn list_event_types(
    State(state): State<AppState>,
    Query(query): Query<EventTypeQuery>,
) -> Result<Json<Vec<NotificationEventType>>, AppError> {
    Ok(Json(
        state
            .notifications()
            .list_event_types(query.notification_type_id)
            .await?,
    ))
}

/// POST /notification-event-types
#[instrument(skip_all)]
async fn create_event_type(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Json(body): Json<NewEventType>,
) -> Result<(StatusCode, Json<NotificationEventType>), AppError> {
    let event_type = state.notifications().create_event_type(body).await?;
    Ok((StatusCode::CREATED, Json(event_type)))
}

/// DELETE /notification-event-types/{id}
///
/// Refused with 409 while enabled rules still reference the event.
#[instrument(skip_all)]
async fn delete_event_type(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<EventTypeId>,
) -> Result<StatusCode, AppError> {
    state.notifications().delete_event_type(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /order-statuses
async fn list_order_statuses(
    State(state): State<AppState>,
) -> Result<Json<Vec<OrderStatus>>, AppError> {
    Ok(Json(state.notifications().list_order_statuses().await?))
}
