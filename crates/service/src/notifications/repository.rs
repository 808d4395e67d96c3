//! Relational source of truth for notification rules and their catalog.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storelink_core::{
    BusinessId, EventTypeId, IntegrationId, NotificationConfigId, NotificationEventType,
    NotificationRule, NotificationType, NotificationTypeId, OrderStatus, OrderStatusId,
};

use crate::db::RepositoryError;

/// Message attached to trigger collisions.
pub const DUPLICATE_RULE: &str = "A similar notification config already exists";

/// A rule to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRule {
    pub business_id: BusinessId,
    pub integration_id: IntegrationId,
    pub notification_type_id: NotificationTypeId,
    pub event_type_id: EventTypeId,
    pub enabled: bool,
    pub description: String,
    pub order_status_ids: Vec<OrderStatusId>,
    pub payment_methods: Vec<String>,
}

/// An event type to be added to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEventType {
    pub notification_type_id: NotificationTypeId,
    pub event_code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reconciliation applied by [`NotificationRepository::sync_rules`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSyncPlan {
    pub create: Vec<NewRule>,
    pub update: Vec<NotificationRule>,
    pub delete: Vec<NotificationConfigId>,
}

/// Storage for rules and the notification catalog.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    // Catalog

    async fn list_types(&self) -> Result<Vec<NotificationType>, RepositoryError>;

    async fn list_event_types(
        &self,
        notification_type_id: Option<NotificationTypeId>,
    ) -> Result<Vec<NotificationEventType>, RepositoryError>;

    async fn get_event_type(&self, id: EventTypeId)
    -> Result<NotificationEventType, RepositoryError>;

    async fn create_event_type(
        &self,
        new: &NewEventType,
    ) -> Result<NotificationEventType, RepositoryError>;

    /// Delete an event type together with the rules referencing it.
    async fn delete_event_type(&self, id: EventTypeId) -> Result<(), RepositoryError>;

    /// Enabled rules referencing an event type.
    async fn count_enabled_rules_for_event(&self, id: EventTypeId)
    -> Result<i64, RepositoryError>;

    async fn list_order_statuses(&self) -> Result<Vec<OrderStatus>, RepositoryError>;

    /// Codes for a batch of status IDs. Unknown IDs are absent from the map.
    async fn order_status_codes(
        &self,
        ids: &[OrderStatusId],
    ) -> Result<HashMap<OrderStatusId, String>, RepositoryError>;

    /// Event codes for a batch of event type IDs.
    async fn event_codes(
        &self,
        ids: &[EventTypeId],
    ) -> Result<HashMap<EventTypeId, String>, RepositoryError>;

    // Rules

    async fn get_rule(&self, id: NotificationConfigId)
    -> Result<NotificationRule, RepositoryError>;

    /// Rules of a business, optionally narrowed to one integration.
    async fn list_rules(
        &self,
        business_id: BusinessId,
        integration_id: Option<IntegrationId>,
    ) -> Result<Vec<NotificationRule>, RepositoryError>;

    async fn list_enabled_rules(&self) -> Result<Vec<NotificationRule>, RepositoryError>;

    /// Rules of any business referencing an event type.
    async fn list_rules_for_event(
        &self,
        event_type_id: EventTypeId,
    ) -> Result<Vec<NotificationRule>, RepositoryError>;

    async fn find_by_trigger(
        &self,
        business_id: BusinessId,
        integration_id: IntegrationId,
        notification_type_id: NotificationTypeId,
        event_type_id: EventTypeId,
    ) -> Result<Option<NotificationRule>, RepositoryError>;

    /// Insert a rule.
    ///
    /// Returns `RepositoryError::Conflict` on a trigger collision.
    async fn insert_rule(&self, new: &NewRule) -> Result<NotificationRule, RepositoryError>;

    /// Overwrite a rule's mutable fields.
    async fn update_rule(
        &self,
        rule: &NotificationRule,
    ) -> Result<NotificationRule, RepositoryError>;

    async fn delete_rule(&self, id: NotificationConfigId) -> Result<(), RepositoryError>;

    /// Apply a whole plan for one `(business, integration)` pair in a single
    /// transaction and return the pair's rules afterwards.
    async fn sync_rules(
        &self,
        business_id: BusinessId,
        integration_id: IntegrationId,
        plan: &RuleSyncPlan,
    ) -> Result<Vec<NotificationRule>, RepositoryError>;
}
