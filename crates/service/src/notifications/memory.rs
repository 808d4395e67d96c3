//! In-memory notification repository for tests and local runs.
//!
//! Seeded with the same catalog as the migrations. Enforces the trigger
//! uniqueness rule and applies sync plans atomically.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use storelink_core::{
    BusinessId, EventTypeId, IntegrationId, NotificationChannel, NotificationConfigId,
    NotificationEventType, NotificationRule, NotificationType, NotificationTypeId, OrderStatus,
    OrderStatusId,
};
use tokio::sync::RwLock;

use super::repository::{DUPLICATE_RULE, NewEventType, NewRule, NotificationRepository, RuleSyncPlan};
use crate::db::RepositoryError;

const SEED_EVENTS: [(&str, &str); 4] = [
    ("order.created", "Order created"),
    ("order.paid", "Order paid"),
    ("order.fulfilled", "Order fulfilled"),
    ("order.cancelled", "Order cancelled"),
];

const SEED_STATUSES: [(&str, &str); 6] = [
    ("pending", "Pending"),
    ("paid", "Paid"),
    ("partially_fulfilled", "Partially fulfilled"),
    ("fulfilled", "Fulfilled"),
    ("cancelled", "Cancelled"),
    ("refunded", "Refunded"),
];

#[derive(Clone)]
struct State {
    types: Vec<NotificationType>,
    event_types: BTreeMap<EventTypeId, NotificationEventType>,
    statuses: Vec<OrderStatus>,
    rules: BTreeMap<NotificationConfigId, NotificationRule>,
    next_event_type_id: i64,
    next_rule_id: i64,
}

impl State {
    fn seeded() -> Self {
        let types = NotificationChannel::ALL
            .iter()
            .map(|channel| NotificationType {
                id: channel.type_id(),
                code: channel.code().to_string(),
                name: channel.code().to_string(),
            })
            .collect::<Vec<_>>();

        let mut event_types = BTreeMap::new();
        let mut next_event_type_id = 1;
        for kind in &types {
            for (code, name) in SEED_EVENTS {
                let id = EventTypeId::new(next_event_type_id);
                next_event_type_id += 1;
                event_types.insert(
                    id,
                    NotificationEventType {
                        id,
                        notification_type_id: kind.id,
                        event_code: code.to_string(),
                        name: name.to_string(),
                        description: None,
                    },
                );
            }
        }

        let statuses = SEED_STATUSES
            .iter()
            .zip(1..)
            .map(|((code, name), id)| OrderStatus {
                id: OrderStatusId::new(id),
                code: (*code).to_string(),
                name: (*name).to_string(),
            })
            .collect();

        Self {
            types,
            event_types,
            statuses,
            rules: BTreeMap::new(),
            next_event_type_id,
            next_rule_id: 1,
        }
    }

    fn insert(&mut self, new: &NewRule) -> NotificationConfigId {
        let id = NotificationConfigId::new(self.next_rule_id);
        self.next_rule_id += 1;
        let now = Utc::now();
        self.rules.insert(
            id,
            NotificationRule {
                id,
                business_id: new.business_id,
                integration_id: new.integration_id,
                notification_type_id: new.notification_type_id,
                event_type_id: new.event_type_id,
                enabled: new.enabled,
                description: new.description.clone(),
                order_status_ids: sorted(&new.order_status_ids),
                payment_methods: new.payment_methods.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    fn update(
        &mut self,
        rule: &NotificationRule,
        scope: Option<(BusinessId, IntegrationId)>,
    ) -> Result<(), RepositoryError> {
        let stored = self
            .rules
            .get_mut(&rule.id)
            .ok_or(RepositoryError::NotFound)?;
        if let Some((business_id, integration_id)) = scope
            && (stored.business_id != business_id || stored.integration_id != integration_id)
        {
            return Err(RepositoryError::NotFound);
        }

        stored.notification_type_id = rule.notification_type_id;
        stored.event_type_id = rule.event_type_id;
        stored.enabled = rule.enabled;
        stored.description.clone_from(&rule.description);
        stored.order_status_ids = sorted(&rule.order_status_ids);
        stored.payment_methods.clone_from(&rule.payment_methods);
        stored.updated_at = Utc::now();
        Ok(())
    }

    /// Mirrors the unique trigger constraint.
    fn check_unique(&self) -> Result<(), RepositoryError> {
        let rules: Vec<&NotificationRule> = self.rules.values().collect();
        for (i, a) in rules.iter().enumerate() {
            if rules.iter().skip(i + 1).any(|b| a.collides_with(b)) {
                return Err(RepositoryError::Conflict(DUPLICATE_RULE.to_string()));
            }
        }
        Ok(())
    }
}

fn sorted(ids: &[OrderStatusId]) -> Vec<OrderStatusId> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();
    ids
}

/// Notification repository held in memory.
pub struct MemoryNotificationRepository {
    state: RwLock<State>,
}

impl Default for MemoryNotificationRepository {
    fn default() -> Self {
        Self {
            state: RwLock::new(State::seeded()),
        }
    }
}

impl MemoryNotificationRepository {
    /// Create a repository with the seeded catalog and no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn list_types(&self) -> Result<Vec<NotificationType>, RepositoryError> {
        Ok(self.state.read().await.types.clone())
    }

    async fn list_event_types(
        &self,
        notification_type_id: Option<NotificationTypeId>,
    ) -> Result<Vec<NotificationEventType>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .event_types
            .values()
            .filter(|e| notification_type_id.is_none_or(|t| e.notification_type_id == t))
            .cloned()
            .collect())
    }

    async fn get_event_type(
        &self,
        id: EventTypeId,
    ) -> Result<NotificationEventType, RepositoryError> {
        self.state
            .read()
            .await
            .event_types
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn create_event_type(
        &self,
        new: &NewEventType,
    ) -> Result<NotificationEventType, RepositoryError> {
        let mut state = self.state.write().await;
        if state.event_types.values().any(|e| {
            e.notification_type_id == new.notification_type_id && e.event_code == new.event_code
        }) {
            return Err(RepositoryError::Conflict(
                "event type already exists for this channel".to_string(),
            ));
        }

        let id = EventTypeId::new(state.next_event_type_id);
        state.next_event_type_id += 1;
        let event_type = NotificationEventType {
            id,
            notification_type_id: new.notification_type_id,
            event_code: new.event_code.clone(),
            name: new.name.clone(),
            description: new.description.clone(),
        };
        state.event_types.insert(id, event_type.clone());
        Ok(event_type)
    }

    async fn delete_event_type(&self, id: EventTypeId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state
            .event_types
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?;
        state.rules.retain(|_, r| r.event_type_id != id);
        Ok(())
    }

    async fn count_enabled_rules_for_event(
        &self,
        id: EventTypeId,
    ) -> Result<i64, RepositoryError> {
        let count = self
            .state
            .read()
            .await
            .rules
            .values()
            .filter(|r| r.enabled && r.event_type_id == id)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn list_order_statuses(&self) -> Result<Vec<OrderStatus>, RepositoryError> {
        Ok(self.state.read().await.statuses.clone())
    }

    async fn order_status_codes(
        &self,
        ids: &[OrderStatusId],
    ) -> Result<HashMap<OrderStatusId, String>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .statuses
            .iter()
            .filter(|s| ids.contains(&s.id))
            .map(|s| (s.id, s.code.clone()))
            .collect())
    }

    async fn event_codes(
        &self,
        ids: &[EventTypeId],
    ) -> Result<HashMap<EventTypeId, String>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .event_types
                    .get(id)
                    .map(|e| (*id, e.event_code.clone()))
            })
            .collect())
    }

    async fn get_rule(
        &self,
        id: NotificationConfigId,
    ) -> Result<NotificationRule, RepositoryError> {
        self.state
            .read()
            .await
            .rules
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_rules(
        &self,
        business_id: BusinessId,
        integration_id: Option<IntegrationId>,
    ) -> Result<Vec<NotificationRule>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .rules
            .values()
            .filter(|r| r.business_id == business_id)
            .filter(|r| integration_id.is_none_or(|i| r.integration_id == i))
            .cloned()
            .collect())
    }

    async fn list_enabled_rules(&self) -> Result<Vec<NotificationRule>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .rules
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }

    async fn list_rules_for_event(
        &self,
        event_type_id: EventTypeId,
    ) -> Result<Vec<NotificationRule>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .rules
            .values()
            .filter(|r| r.event_type_id == event_type_id)
            .cloned()
            .collect())
    }

    async fn find_by_trigger(
        &self,
        business_id: BusinessId,
        integration_id: IntegrationId,
        notification_type_id: NotificationTypeId,
        event_type_id: EventTypeId,
    ) -> Result<Option<NotificationRule>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .rules
            .values()
            .find(|r| {
                r.business_id == business_id
                    && r.integration_id == integration_id
                    && r.trigger() == (notification_type_id, event_type_id)
            })
            .cloned())
    }

    async fn insert_rule(&self, new: &NewRule) -> Result<NotificationRule, RepositoryError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let id = next.insert(new);
        next.check_unique()?;
        *state = next;
        state.rules.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn update_rule(
        &self,
        rule: &NotificationRule,
    ) -> Result<NotificationRule, RepositoryError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.update(rule, None)?;
        next.check_unique()?;
        *state = next;
        state.rules.get(&rule.id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn delete_rule(&self, id: NotificationConfigId) -> Result<(), RepositoryError> {
        self.state
            .write()
            .await
            .rules
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn sync_rules(
        &self,
        business_id: BusinessId,
        integration_id: IntegrationId,
        plan: &RuleSyncPlan,
    ) -> Result<Vec<NotificationRule>, RepositoryError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();

        for id in &plan.delete {
            if next
                .rules
                .get(id)
                .is_some_and(|r| r.business_id == business_id && r.integration_id == integration_id)
            {
                next.rules.remove(id);
            }
        }
        for new in &plan.create {
            next.insert(new);
        }
        for rule in &plan.update {
            next.update(rule, Some((business_id, integration_id)))?;
        }
        next.check_unique()?;

        *state = next;
        Ok(state
            .rules
            .values()
            .filter(|r| r.business_id == business_id && r.integration_id == integration_id)
            .cloned()
            .collect())
    }
}
