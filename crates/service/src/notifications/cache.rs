//! Write-through cache of notification rules.
//!
//! # Key schema
//!
//! | Key | Value |
//! |-----|-------|
//! | `notification:configs:{integration}:{type}:{event}` | hash `rule_id -> rule JSON` |
//! | `notification:configs:evt:{integration}:{event_code}` | hash `rule_id -> rule JSON` |
//! | `notification:config:{rule_id}:keys` | hash `key -> "1"` (reverse index) |
//!
//! The reverse index records every key holding a rule so removals can purge
//! all of them. When it can't be read, removal falls back to the keys derived
//! from the rule itself.
//!
//! Cache writes never decide the outcome of a relational write: callers log
//! failures and the start-up warmup restores consistency.

use std::collections::BTreeSet;
use std::sync::Arc;

use storelink_core::{
    CachedRule, EventTypeId, IntegrationId, NotificationConfigId, NotificationRule,
    NotificationTypeId, OrderStatusId,
};
use tracing::{info, instrument, warn};

use super::NotificationError;
use super::kv::{KvError, KvStore};
use super::repository::NotificationRepository;

/// Prefix of the primary and event-code keys.
pub const CONFIGS_PREFIX: &str = "notification:configs";

/// Primary key: rules of one trigger on one integration.
#[must_use]
pub fn primary_key(
    integration_id: IntegrationId,
    notification_type_id: NotificationTypeId,
    event_type_id: EventTypeId,
) -> String {
    format!("{CONFIGS_PREFIX}:{integration_id}:{notification_type_id}:{event_type_id}")
}

/// Secondary key: rules of one event code on one integration.
#[must_use]
pub fn event_key(integration_id: IntegrationId, event_code: &str) -> String {
    format!("{CONFIGS_PREFIX}:evt:{integration_id}:{event_code}")
}

/// Reverse index of a rule.
#[must_use]
pub fn reverse_key(rule_id: NotificationConfigId) -> String {
    format!("notification:config:{rule_id}:keys")
}

/// Counters of a warmup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WarmupReport {
    pub cached: usize,
    pub failed: usize,
}

/// Rule cache over a [`KvStore`].
pub struct NotificationCache {
    kv: Arc<dyn KvStore>,
    repository: Arc<dyn NotificationRepository>,
}

impl NotificationCache {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, repository: Arc<dyn NotificationRepository>) -> Self {
        Self { kv, repository }
    }

    /// Denormalize a rule with its event code and status codes.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the lookups fail.
    pub async fn resolve(&self, rule: &NotificationRule) -> Result<CachedRule, NotificationError> {
        let event_code = self
            .repository
            .event_codes(&[rule.event_type_id])
            .await?
            .remove(&rule.event_type_id);
        let statuses = self
            .repository
            .order_status_codes(&rule.order_status_ids)
            .await?;
        let codes = rule
            .order_status_ids
            .iter()
            .filter_map(|id| statuses.get(id).cloned())
            .collect();
        Ok(CachedRule::from_rule(rule, event_code, codes))
    }

    /// Load every enabled rule into the cache.
    ///
    /// Event and status codes are resolved in one batch each. A rule that
    /// fails to cache is logged and counted; the rest carry on.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the rules or codes can't
    /// be read.
    #[instrument(skip(self))]
    pub async fn warmup(&self) -> Result<WarmupReport, NotificationError> {
        let rules = self.repository.list_enabled_rules().await?;

        let status_ids: Vec<OrderStatusId> = rules
            .iter()
            .flat_map(|r| r.order_status_ids.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let event_ids: Vec<EventTypeId> = rules
            .iter()
            .map(|r| r.event_type_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let statuses = self.repository.order_status_codes(&status_ids).await?;
        let events = self.repository.event_codes(&event_ids).await?;

        let mut report = WarmupReport::default();
        for rule in &rules {
            let codes = rule
                .order_status_ids
                .iter()
                .filter_map(|id| statuses.get(id).cloned())
                .collect();
            let cached = CachedRule::from_rule(rule, events.get(&rule.event_type_id).cloned(), codes);
            match self.cache_one(&cached).await {
                Ok(()) => report.cached += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(rule_id = %rule.id, error = %e, "Failed to cache notification rule");
                }
            }
        }

        info!(cached = report.cached, failed = report.failed, "Notification cache warmed up");
        Ok(report)
    }

    /// Write a rule into its primary key, its event key when the event code
    /// is known, and the reverse index.
    ///
    /// # Errors
    ///
    /// Returns `KvError` on the first failed write.
    pub async fn cache_one(&self, rule: &CachedRule) -> Result<(), KvError> {
        let payload = serde_json::to_string(rule)
            .map_err(|e| KvError::Unavailable(format!("rule {} not serializable: {e}", rule.id)))?;
        let field = rule.id.to_string();
        let reverse = reverse_key(rule.id);

        for key in derived_keys(rule) {
            self.kv.hset(&key, &field, &payload).await?;
            self.kv.hset(&reverse, &key, "1").await?;
        }
        Ok(())
    }

    /// Move a rule from its old location to its new one.
    ///
    /// # Errors
    ///
    /// Returns `KvError` on the first failed write.
    pub async fn update_one(&self, old: &CachedRule, new: &CachedRule) -> Result<(), KvError> {
        let moved = old.integration_id != new.integration_id
            || old.notification_type_id != new.notification_type_id
            || old.event_type_id != new.event_type_id
            || old.event_code != new.event_code;

        if moved {
            let field = old.id.to_string();
            let reverse = reverse_key(old.id);
            for key in derived_keys(old) {
                self.kv.hdel(&key, &field).await?;
                self.kv.hdel(&reverse, &key).await?;
            }
        }
        self.cache_one(new).await
    }

    /// Remove a rule from every key holding it and drop its reverse index.
    ///
    /// # Errors
    ///
    /// Returns `KvError` on the first failed delete.
    pub async fn remove_one(&self, rule: &CachedRule) -> Result<(), KvError> {
        let reverse = reverse_key(rule.id);
        let mut keys: BTreeSet<String> = match self.kv.hgetall(&reverse).await {
            Ok(index) => index.into_keys().collect(),
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "Reverse index unreadable, using derived keys");
                BTreeSet::new()
            }
        };
        keys.extend(derived_keys(rule));

        let field = rule.id.to_string();
        for key in &keys {
            self.kv.hdel(key, &field).await?;
        }
        self.kv.del(&[reverse]).await
    }

    /// Drop every cached rule of an integration.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the scan or delete fails.
    #[instrument(skip(self))]
    pub async fn invalidate_integration(&self, integration_id: IntegrationId) -> Result<usize, KvError> {
        let mut keys = self
            .kv
            .scan(&format!("{CONFIGS_PREFIX}:{integration_id}:*"))
            .await?;
        keys.extend(
            self.kv
                .scan(&format!("{CONFIGS_PREFIX}:evt:{integration_id}:*"))
                .await?,
        );
        self.kv.del(&keys).await?;
        Ok(keys.len())
    }

    /// Drop the whole cache, reverse indexes included.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the scan or delete fails.
    #[instrument(skip(self))]
    pub async fn invalidate_all(&self) -> Result<usize, KvError> {
        let mut keys = self.kv.scan(&format!("{CONFIGS_PREFIX}:*")).await?;
        keys.extend(self.kv.scan("notification:config:*:keys").await?);
        self.kv.del(&keys).await?;
        Ok(keys.len())
    }

    /// Enabled rules of one trigger.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the key can't be read.
    pub async fn lookup(
        &self,
        integration_id: IntegrationId,
        notification_type_id: NotificationTypeId,
        event_type_id: EventTypeId,
    ) -> Result<Vec<CachedRule>, KvError> {
        self.read_rules(&primary_key(integration_id, notification_type_id, event_type_id))
            .await
    }

    /// Enabled rules of one event code, across channels.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the key can't be read.
    pub async fn lookup_by_event(
        &self,
        integration_id: IntegrationId,
        event_code: &str,
    ) -> Result<Vec<CachedRule>, KvError> {
        self.read_rules(&event_key(integration_id, event_code)).await
    }

    async fn read_rules(&self, key: &str) -> Result<Vec<CachedRule>, KvError> {
        let mut rules: Vec<CachedRule> = self
            .kv
            .hgetall(key)
            .await?
            .into_iter()
            .filter_map(|(field, payload)| match serde_json::from_str::<CachedRule>(&payload) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(key, field = %field, error = %e, "Skipping unreadable cached rule");
                    None
                }
            })
            .filter(|rule| rule.enabled)
            .collect();
        rules.sort_by_key(|rule| rule.id);
        Ok(rules)
    }
}

fn derived_keys(rule: &CachedRule) -> Vec<String> {
    let mut keys = vec![primary_key(
        rule.integration_id,
        rule.notification_type_id,
        rule.event_type_id,
    )];
    if let Some(code) = rule.event_code.as_deref() {
        keys.push(event_key(rule.integration_id, code));
    }
    keys
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use storelink_core::BusinessId;

    use crate::notifications::kv::MemoryKvStore;
    use crate::notifications::memory::MemoryNotificationRepository;
    use crate::notifications::repository::NewRule;

    fn cached(id: i64, event: i64, code: Option<&str>, enabled: bool) -> CachedRule {
        CachedRule {
            id: NotificationConfigId::new(id),
            business_id: Some(BusinessId::new(7)),
            integration_id: IntegrationId::new(100),
            notification_type_id: NotificationTypeId::new(1),
            event_type_id: EventTypeId::new(event),
            enabled,
            description: String::new(),
            order_status_ids: vec![],
            event_code: code.map(str::to_string),
            order_status_codes: vec![],
            payment_methods: vec![],
        }
    }

    fn cache() -> (NotificationCache, Arc<MemoryKvStore>, Arc<MemoryNotificationRepository>) {
        let kv = Arc::new(MemoryKvStore::new());
        let repo = Arc::new(MemoryNotificationRepository::new());
        (NotificationCache::new(kv.clone(), repo.clone()), kv, repo)
    }

    #[test]
    fn test_key_schema() {
        let i = IntegrationId::new(100);
        assert_eq!(
            primary_key(i, NotificationTypeId::new(1), EventTypeId::new(5)),
            "notification:configs:100:1:5"
        );
        assert_eq!(event_key(i, "order.created"), "notification:configs:evt:100:order.created");
        assert_eq!(reverse_key(NotificationConfigId::new(9)), "notification:config:9:keys");
    }

    #[tokio::test]
    async fn test_cache_one_writes_reverse_index() {
        let (cache, kv, _) = cache();
        cache.cache_one(&cached(1, 1, Some("order.created"), true)).await.unwrap();

        let index = kv.hgetall("notification:config:1:keys").await.unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains_key("notification:configs:100:1:1"));
        assert!(index.contains_key("notification:configs:evt:100:order.created"));

        let found = cache
            .lookup_by_event(IntegrationId::new(100), "order.created")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_returns_enabled_only() {
        let (cache, _, _) = cache();
        cache.cache_one(&cached(1, 1, None, true)).await.unwrap();
        cache.cache_one(&cached(2, 1, None, false)).await.unwrap();

        let found = cache
            .lookup(IntegrationId::new(100), NotificationTypeId::new(1), EventTypeId::new(1))
            .await
            .unwrap();
        assert_eq!(found.iter().map(|r| r.id.as_i64()).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_update_one_moves_rule() {
        let (cache, kv, _) = cache();
        let old = cached(1, 1, Some("order.created"), true);
        let new = cached(1, 2, Some("order.paid"), true);
        cache.cache_one(&old).await.unwrap();
        cache.update_one(&old, &new).await.unwrap();

        assert!(kv.hgetall("notification:configs:100:1:1").await.unwrap().is_empty());
        assert!(kv.hgetall("notification:configs:evt:100:order.created").await.unwrap().is_empty());
        assert_eq!(kv.hgetall("notification:configs:100:1:2").await.unwrap().len(), 1);

        let index = kv.hgetall("notification:config:1:keys").await.unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains_key("notification:configs:evt:100:order.paid"));
    }

    #[tokio::test]
    async fn test_remove_one_purges_every_location() {
        let (cache, kv, _) = cache();
        let rule = cached(1, 1, Some("order.created"), true);
        cache.cache_one(&rule).await.unwrap();
        cache.cache_one(&cached(2, 1, None, true)).await.unwrap();

        // Forget the event code: the reverse index still knows the event key.
        let mut partial = rule.clone();
        partial.event_code = None;
        cache.remove_one(&partial).await.unwrap();

        assert_eq!(kv.keys().await, vec![
            "notification:config:2:keys".to_string(),
            "notification:configs:100:1:1".to_string(),
        ]);
    }

    #[tokio::test]
    async fn test_invalidate_integration_and_all() {
        let (cache, kv, _) = cache();
        cache.cache_one(&cached(1, 1, Some("order.created"), true)).await.unwrap();
        let mut other = cached(2, 1, None, true);
        other.integration_id = IntegrationId::new(1000);
        cache.cache_one(&other).await.unwrap();

        assert_eq!(cache.invalidate_integration(IntegrationId::new(100)).await.unwrap(), 2);
        assert_eq!(kv.hgetall("notification:configs:1000:1:1").await.unwrap().len(), 1);

        cache.invalidate_all().await.unwrap();
        assert!(kv.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_warmup_resolves_codes_and_tolerates_failures() {
        let (cache, kv, repo) = cache();
        for (event, enabled) in [(1, true), (2, false)] {
            repo.insert_rule(&NewRule {
                business_id: BusinessId::new(7),
                integration_id: IntegrationId::new(100),
                notification_type_id: NotificationTypeId::new(1),
                event_type_id: EventTypeId::new(event),
                enabled,
                description: String::new(),
                order_status_ids: vec![OrderStatusId::new(2)],
                payment_methods: vec![],
            })
            .await
            .unwrap();
        }

        let report = cache.warmup().await.unwrap();
        assert_eq!(report, WarmupReport { cached: 1, failed: 0 });

        let found = cache
            .lookup_by_event(IntegrationId::new(100), "order.created")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_status_codes, vec!["paid".to_string()]);

        kv.set_failing(true);
        let report = cache.warmup().await.unwrap();
        assert_eq!(report, WarmupReport { cached: 0, failed: 1 });
    }
}
