//! Notification-config use cases.
//!
//! Every mutation persists first and then updates the routing cache. Cache
//! failures are logged and never change the outcome of the call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storelink_core::{
    BusinessId, CachedRule, EventTypeId, IntegrationId, NotificationConfigId,
    NotificationEventType, NotificationRule, NotificationType, NotificationTypeId, OrderStatus,
    OrderStatusId, RuleSubject,
};
use tracing::{info, instrument, warn};

use super::cache::NotificationCache;
use super::repository::{DUPLICATE_RULE, NewEventType, NewRule, NotificationRepository, RuleSyncPlan};
use super::{DUPLICATE_IN_BATCH, NotificationError};
use crate::db::RepositoryError;

/// Partial update of a rule. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RulePatch {
    pub notification_type_id: Option<NotificationTypeId>,
    pub event_type_id: Option<EventTypeId>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
    pub order_status_ids: Option<Vec<OrderStatusId>>,
    pub payment_methods: Option<Vec<String>>,
}

impl RulePatch {
    fn apply(self, rule: &mut NotificationRule) {
        if let Some(id) = self.notification_type_id {
            rule.notification_type_id = id;
        }
        if let Some(id) = self.event_type_id {
            rule.event_type_id = id;
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(description) = self.description {
            rule.description = description;
        }
        if let Some(ids) = self.order_status_ids {
            rule.order_status_ids = ids;
        }
        if let Some(methods) = self.payment_methods {
            rule.payment_methods = methods;
        }
    }
}

/// One entry of a batch sync. With an `id` it updates that rule, without
/// one it creates a new rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleInput {
    #[serde(default)]
    pub id: Option<NotificationConfigId>,
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

/// Outcome of a batch sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Rule and catalog operations over the relational store and the cache.
pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
    cache: Arc<NotificationCache>,
}

impl NotificationService {
    #[must_use]
    pub fn new(repository: Arc<dyn NotificationRepository>, cache: Arc<NotificationCache>) -> Self {
        Self { repository, cache }
    }

    #[must_use]
    pub fn cache(&self) -> &NotificationCache {
        &self.cache
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Create a rule.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Conflict` if the business/integration pair
    /// already has a rule for the same channel and event, and
    /// `NotificationError::Validation` for unknown catalog references.
    #[instrument(skip(self, new), fields(integration_id = %new.integration_id))]
    pub async fn create(&self, new: NewRule) -> Result<NotificationRule, NotificationError> {
        self.check_references(new.event_type_id, &new.order_status_ids)
            .await?;

        if self
            .repository
            .find_by_trigger(
                new.business_id,
                new.integration_id,
                new.notification_type_id,
                new.event_type_id,
            )
            .await?
            .is_some()
        {
            return Err(NotificationError::Conflict(DUPLICATE_RULE.to_string()));
        }

        let rule = self.repository.insert_rule(&new).await?;
        info!(rule_id = %rule.id, "Notification config created");

        self.cache_rule(&rule).await;
        Ok(rule)
    }

    /// Fetch a rule of the caller's business.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::RuleNotFound` if the rule doesn't exist or
    /// belongs to another business.
    pub async fn get(
        &self,
        business_id: BusinessId,
        id: NotificationConfigId,
    ) -> Result<NotificationRule, NotificationError> {
        match self.repository.get_rule(id).await {
            Ok(rule) if rule.business_id == business_id => Ok(rule),
            Ok(_) | Err(RepositoryError::NotFound) => Err(NotificationError::RuleNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Rules of a business, optionally narrowed to one integration.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the store fails.
    pub async fn list(
        &self,
        business_id: BusinessId,
        integration_id: Option<IntegrationId>,
    ) -> Result<Vec<NotificationRule>, NotificationError> {
        Ok(self.repository.list_rules(business_id, integration_id).await?)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::RuleNotFound` for unknown rules and
    /// `NotificationError::Conflict` if the new trigger collides with another
    /// rule.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        business_id: BusinessId,
        id: NotificationConfigId,
        patch: RulePatch,
    ) -> Result<NotificationRule, NotificationError> {
        let old = self.get(business_id, id).await?;
        let mut next = old.clone();
        patch.apply(&mut next);

        self.check_references(next.event_type_id, &next.order_status_ids)
            .await?;
        if next.trigger() != old.trigger()
            && self
                .repository
                .find_by_trigger(
                    next.business_id,
                    next.integration_id,
                    next.notification_type_id,
                    next.event_type_id,
                )
                .await?
                .is_some_and(|other| other.id != id)
        {
            return Err(NotificationError::Conflict(DUPLICATE_RULE.to_string()));
        }

        let rule = self.repository.update_rule(&next).await?;
        info!(rule_id = %rule.id, "Notification config updated");

        let result = async {
            let old = self.cache.resolve(&old).await?;
            let new = self.cache.resolve(&rule).await?;
            self.cache.update_one(&old, &new).await?;
            Ok::<_, NotificationError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(rule_id = %rule.id, error = %e, "Failed to update cached notification config");
        }
        Ok(rule)
    }

    /// Delete a rule.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::RuleNotFound` for unknown rules.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        business_id: BusinessId,
        id: NotificationConfigId,
    ) -> Result<(), NotificationError> {
        let rule = self.get(business_id, id).await?;
        self.repository.delete_rule(id).await?;
        info!(rule_id = %id, "Notification config deleted");

        self.uncache_rule(&rule).await;
        Ok(())
    }

    /// Evaluate a rule's conditions against an order.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::RuleNotFound` for unknown rules.
    pub async fn evaluate(
        &self,
        business_id: BusinessId,
        id: NotificationConfigId,
        subject: &RuleSubject,
    ) -> Result<bool, NotificationError> {
        let rule = self.get(business_id, id).await?;
        Ok(rule.enabled && rule.matches(subject))
    }

    /// Reconcile the rules of a business/integration pair with `inputs`.
    ///
    /// Entries with an ID update that rule, entries without one are created
    /// and stored rules missing from the batch are deleted, all in one
    /// transaction. The integration's cache namespace is then rebuilt.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Conflict` with `duplicate-rule` if two
    /// entries share a channel and event, and
    /// `NotificationError::Validation` if an ID belongs to another pair.
    #[instrument(skip(self, inputs), fields(rules = inputs.len()))]
    pub async fn sync(
        &self,
        business_id: BusinessId,
        integration_id: IntegrationId,
        inputs: Vec<RuleInput>,
    ) -> Result<SyncSummary, NotificationError> {
        let mut triggers = BTreeSet::new();
        for input in &inputs {
            if !triggers.insert((input.notification_type_id, input.event_type_id)) {
                return Err(NotificationError::Conflict(DUPLICATE_IN_BATCH.to_string()));
            }
        }
        for input in &inputs {
            self.check_references(input.event_type_id, &input.order_status_ids)
                .await?;
        }

        let mut existing: BTreeMap<NotificationConfigId, NotificationRule> = self
            .repository
            .list_rules(business_id, Some(integration_id))
            .await?
            .into_iter()
            .map(|rule| (rule.id, rule))
            .collect();

        let mut plan = RuleSyncPlan::default();
        for input in inputs {
            match input.id {
                Some(id) => {
                    let mut rule = existing.remove(&id).ok_or_else(|| {
                        NotificationError::Validation(format!(
                            "notification config {id} does not belong to integration {integration_id}"
                        ))
                    })?;
                    rule.notification_type_id = input.notification_type_id;
                    rule.event_type_id = input.event_type_id;
                    rule.enabled = input.enabled;
                    rule.description = input.description;
                    rule.order_status_ids = input.order_status_ids;
                    rule.payment_methods = input.payment_methods;
                    plan.update.push(rule);
                }
                None => plan.create.push(NewRule {
                    business_id,
                    integration_id,
                    notification_type_id: input.notification_type_id,
                    event_type_id: input.event_type_id,
                    enabled: input.enabled,
                    description: input.description,
                    order_status_ids: input.order_status_ids,
                    payment_methods: input.payment_methods,
                }),
            }
        }
        let removed: Vec<NotificationRule> = existing.into_values().collect();
        plan.delete = removed.iter().map(|rule| rule.id).collect();

        let rules = self
            .repository
            .sync_rules(business_id, integration_id, &plan)
            .await?;
        let summary = SyncSummary {
            created: plan.create.len(),
            updated: plan.update.len(),
            deleted: plan.delete.len(),
        };
        info!(
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            "Notification configs synced"
        );

        for rule in &removed {
            self.uncache_rule(rule).await;
        }
        if let Err(e) = self.cache.invalidate_integration(integration_id).await {
            warn!(%integration_id, error = %e, "Failed to invalidate notification cache");
        }
        for rule in &rules {
            self.cache_rule(rule).await;
        }
        Ok(summary)
    }

    // =========================================================================
    // Cache reads
    // =========================================================================

    /// Enabled rules of one channel and event, from the cache.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Kv` if the cache can't be read.
    pub async fn lookup(
        &self,
        integration_id: IntegrationId,
        notification_type_id: NotificationTypeId,
        event_type_id: EventTypeId,
    ) -> Result<Vec<CachedRule>, NotificationError> {
        Ok(self
            .cache
            .lookup(integration_id, notification_type_id, event_type_id)
            .await?)
    }

    /// Enabled rules of one event code across channels, from the cache.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Kv` if the cache can't be read.
    pub async fn lookup_by_event(
        &self,
        integration_id: IntegrationId,
        event_code: &str,
    ) -> Result<Vec<CachedRule>, NotificationError> {
        Ok(self.cache.lookup_by_event(integration_id, event_code).await?)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the store fails.
    pub async fn list_types(&self) -> Result<Vec<NotificationType>, NotificationError> {
        Ok(self.repository.list_types().await?)
    }

    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the store fails.
    pub async fn list_event_types(
        &self,
        notification_type_id: Option<NotificationTypeId>,
    ) -> Result<Vec<NotificationEventType>, NotificationError> {
        Ok(self.repository.list_event_types(notification_type_id).await?)
    }

    /// Add an event to a channel's catalog.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Validation` for a blank code or unknown
    /// channel, and `NotificationError::Conflict` if the code already exists
    /// on that channel.
    pub async fn create_event_type(
        &self,
        new: NewEventType,
    ) -> Result<NotificationEventType, NotificationError> {
        if new.event_code.trim().is_empty() {
            return Err(NotificationError::Validation("event_code is required".to_string()));
        }
        let types = self.repository.list_types().await?;
        if !types.iter().any(|t| t.id == new.notification_type_id) {
            return Err(NotificationError::Validation(format!(
                "unknown notification type {}",
                new.notification_type_id
            )));
        }
        Ok(self.repository.create_event_type(&new).await?)
    }

    /// Delete an event type no enabled rule references.
    ///
    /// Disabled rules referencing it are deleted along with it.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::EventTypeInUse` with the number of enabled
    /// rules blocking the deletion.
    #[instrument(skip(self))]
    pub async fn delete_event_type(&self, id: EventTypeId) -> Result<(), NotificationError> {
        match self.repository.get_event_type(id).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound) => {
                return Err(NotificationError::NotFound(format!("event type {id}")));
            }
            Err(e) => return Err(e.into()),
        }

        let count = self.repository.count_enabled_rules_for_event(id).await?;
        if count > 0 {
            return Err(NotificationError::EventTypeInUse { count });
        }

        let dropped = self.repository.list_rules_for_event(id).await?;
        self.repository.delete_event_type(id).await?;
        info!(event_type_id = %id, rules = dropped.len(), "Notification event type deleted");

        for rule in &dropped {
            self.uncache_rule(rule).await;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the store fails.
    pub async fn list_order_statuses(&self) -> Result<Vec<OrderStatus>, NotificationError> {
        Ok(self.repository.list_order_statuses().await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn check_references(
        &self,
        event_type_id: EventTypeId,
        order_status_ids: &[OrderStatusId],
    ) -> Result<(), NotificationError> {
        match self.repository.get_event_type(event_type_id).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound) => {
                return Err(NotificationError::Validation(format!(
                    "unknown event type {event_type_id}"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        if !order_status_ids.is_empty() {
            let known = self.repository.order_status_codes(order_status_ids).await?;
            if let Some(unknown) = order_status_ids.iter().find(|id| !known.contains_key(id)) {
                return Err(NotificationError::Validation(format!(
                    "unknown order status {unknown}"
                )));
            }
        }
        Ok(())
    }

    async fn cache_rule(&self, rule: &NotificationRule) {
        let result = async {
            let cached = self.cache.resolve(rule).await?;
            self.cache.cache_one(&cached).await?;
            Ok::<_, NotificationError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(rule_id = %rule.id, error = %e, "Failed to cache notification config");
        }
    }

    async fn uncache_rule(&self, rule: &NotificationRule) {
        // The reverse index covers the event key when the code can't be resolved.
        let cached = match self.cache.resolve(rule).await {
            Ok(cached) => cached,
            Err(_) => CachedRule::from_rule(rule, None, Vec::new()),
        };
        if let Err(e) = self.cache.remove_one(&cached).await {
            warn!(rule_id = %rule.id, error = %e, "Failed to remove cached notification config");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::notifications::kv::{KvStore, MemoryKvStore};
    use crate::notifications::memory::MemoryNotificationRepository;

    const BUSINESS: BusinessId = BusinessId::new(7);
    const INTEGRATION: IntegrationId = IntegrationId::new(100);

    fn service() -> (NotificationService, Arc<MemoryKvStore>, Arc<MemoryNotificationRepository>) {
        let kv = Arc::new(MemoryKvStore::new());
        let repo = Arc::new(MemoryNotificationRepository::new());
        let cache = Arc::new(NotificationCache::new(kv.clone(), repo.clone()));
        (NotificationService::new(repo.clone(), cache), kv, repo)
    }

    fn new_rule(channel: i64, event: i64) -> NewRule {
        NewRule {
            business_id: BUSINESS,
            integration_id: INTEGRATION,
            notification_type_id: NotificationTypeId::new(channel),
            event_type_id: EventTypeId::new(event),
            enabled: true,
            description: String::new(),
            order_status_ids: vec![],
            payment_methods: vec![],
        }
    }

    fn input(id: Option<i64>, channel: i64, event: i64) -> RuleInput {
        RuleInput {
            id: id.map(NotificationConfigId::new),
            notification_type_id: NotificationTypeId::new(channel),
            event_type_id: EventTypeId::new(event),
            enabled: true,
            description: String::new(),
            order_status_ids: vec![],
            payment_methods: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_caches_rule() {
        let (service, kv, _) = service();
        let rule = service.create(new_rule(1, 1)).await.unwrap();

        let cached = kv.hgetall("notification:configs:100:1:1").await.unwrap();
        assert!(cached.contains_key(&rule.id.to_string()));
        let by_event = service.lookup_by_event(INTEGRATION, "order.created").await.unwrap();
        assert_eq!(by_event.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected_and_changes_nothing() {
        let (service, kv, repo) = service();
        service.create(new_rule(1, 5)).await.unwrap();
        let keys_before = kv.keys().await;

        let err = service.create(new_rule(1, 5)).await.unwrap_err();
        assert!(matches!(&err, NotificationError::Conflict(m) if m == DUPLICATE_RULE));
        assert_eq!(repo.list_rules(BUSINESS, None).await.unwrap().len(), 1);
        assert_eq!(kv.keys().await, keys_before);
    }

    #[tokio::test]
    async fn test_create_survives_cache_outage() {
        let (service, kv, repo) = service();
        kv.set_failing(true);

        let rule = service.create(new_rule(1, 1)).await.unwrap();
        assert_eq!(repo.get_rule(rule.id).await.unwrap(), rule);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_references() {
        let (service, _, _) = service();
        let err = service.create(new_rule(1, 999)).await.unwrap_err();
        assert!(matches!(err, NotificationError::Validation(_)));

        let mut rule = new_rule(1, 1);
        rule.order_status_ids = vec![OrderStatusId::new(42)];
        let err = service.create(rule).await.unwrap_err();
        assert!(matches!(err, NotificationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_moves_cached_rule() {
        let (service, kv, _) = service();
        let rule = service.create(new_rule(1, 1)).await.unwrap();

        let patch = RulePatch {
            event_type_id: Some(EventTypeId::new(2)),
            ..RulePatch::default()
        };
        let updated = service.update(BUSINESS, rule.id, patch).await.unwrap();
        assert_eq!(updated.event_type_id, EventTypeId::new(2));

        assert!(kv.hgetall("notification:configs:100:1:1").await.unwrap().is_empty());
        assert_eq!(kv.hgetall("notification:configs:100:1:2").await.unwrap().len(), 1);
        assert!(service.lookup_by_event(INTEGRATION, "order.created").await.unwrap().is_empty());
        assert_eq!(service.lookup_by_event(INTEGRATION, "order.paid").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_rejects_trigger_collision() {
        let (service, _, _) = service();
        service.create(new_rule(1, 1)).await.unwrap();
        let second = service.create(new_rule(1, 2)).await.unwrap();

        let patch = RulePatch {
            event_type_id: Some(EventTypeId::new(1)),
            ..RulePatch::default()
        };
        let err = service.update(BUSINESS, second.id, patch).await.unwrap_err();
        assert!(matches!(err, NotificationError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_purges_cache() {
        let (service, kv, _) = service();
        let rule = service.create(new_rule(1, 1)).await.unwrap();
        service.delete(BUSINESS, rule.id).await.unwrap();

        assert!(kv.keys().await.is_empty());
        assert!(matches!(
            service.delete(BUSINESS, rule.id).await,
            Err(NotificationError::RuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_other_business_cannot_see_rule() {
        let (service, _, _) = service();
        let rule = service.create(new_rule(1, 1)).await.unwrap();
        assert!(matches!(
            service.get(BusinessId::new(8), rule.id).await,
            Err(NotificationError::RuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_evaluate_checks_conditions() {
        let (service, _, _) = service();
        let mut new = new_rule(1, 1);
        new.order_status_ids = vec![OrderStatusId::new(2)];
        let rule = service.create(new).await.unwrap();

        let paid = RuleSubject {
            order_status_id: Some(OrderStatusId::new(2)),
            payment_method: None,
        };
        let pending = RuleSubject {
            order_status_id: Some(OrderStatusId::new(1)),
            payment_method: None,
        };
        assert!(service.evaluate(BUSINESS, rule.id, &paid).await.unwrap());
        assert!(!service.evaluate(BUSINESS, rule.id, &pending).await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_creates_updates_and_deletes() {
        let (service, kv, repo) = service();
        let a = service.create(new_rule(1, 1)).await.unwrap();
        let b = service.create(new_rule(1, 2)).await.unwrap();
        let c = service.create(new_rule(1, 3)).await.unwrap();

        let summary = service
            .sync(BUSINESS, INTEGRATION, vec![
                input(Some(a.id.as_i64()), 1, 1),
                input(Some(b.id.as_i64()), 1, 2),
                input(None, 1, 4),
            ])
            .await
            .unwrap();
        assert_eq!(summary, SyncSummary { created: 1, updated: 2, deleted: 1 });

        let rules = repo.list_rules(BUSINESS, Some(INTEGRATION)).await.unwrap();
        assert_eq!(rules.len(), 3);
        assert!(rules.iter().all(|r| r.id != c.id));

        let primary: Vec<String> = kv
            .keys()
            .await
            .into_iter()
            .filter(|k| k.starts_with("notification:configs:100:"))
            .collect();
        assert_eq!(primary, vec![
            "notification:configs:100:1:1".to_string(),
            "notification:configs:100:1:2".to_string(),
            "notification:configs:100:1:4".to_string(),
        ]);
        assert!(kv.hgetall(&format!("notification:config:{}:keys", c.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_rejects_duplicates_in_batch() {
        let (service, _, repo) = service();
        let err = service
            .sync(BUSINESS, INTEGRATION, vec![input(None, 1, 1), input(None, 1, 1)])
            .await
            .unwrap_err();
        assert!(matches!(&err, NotificationError::Conflict(m) if m == DUPLICATE_IN_BATCH));
        assert!(repo.list_rules(BUSINESS, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_rejects_foreign_ids() {
        let (service, _, repo) = service();
        let mut other = new_rule(1, 1);
        other.integration_id = IntegrationId::new(200);
        let foreign = service.create(other).await.unwrap();

        let err = service
            .sync(BUSINESS, INTEGRATION, vec![input(Some(foreign.id.as_i64()), 1, 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Validation(_)));
        assert_eq!(repo.get_rule(foreign.id).await.unwrap(), foreign);
    }

    #[tokio::test]
    async fn test_event_type_delete_guard() {
        let (service, kv, _) = service();
        let rule = service.create(new_rule(1, 1)).await.unwrap();

        let err = service.delete_event_type(EventTypeId::new(1)).await.unwrap_err();
        assert!(matches!(err, NotificationError::EventTypeInUse { count: 1 }));
        assert!(err.to_string().contains('1'));

        let patch = RulePatch {
            enabled: Some(false),
            ..RulePatch::default()
        };
        service.update(BUSINESS, rule.id, patch).await.unwrap();

        // Only a disabled rule remains: it goes with the event type.
        service.delete_event_type(EventTypeId::new(1)).await.unwrap();
        assert!(matches!(
            service.get(BUSINESS, rule.id).await,
            Err(NotificationError::RuleNotFound(_))
        ));
        assert!(kv.keys().await.is_empty());
        assert!(matches!(
            service.delete_event_type(EventTypeId::new(1)).await,
            Err(NotificationError::NotFound(_))
        ));
    }
}
