//! Notification routing rules and their catalogs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{
    BusinessId, EventTypeId, IntegrationId, NotificationConfigId, NotificationTypeId,
    OrderStatusId,
};

/// Outbound notification channel.
///
/// The discriminants match the seeded `notification_types` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Whatsapp,
    Email,
    Sms,
    Sse,
}

impl NotificationChannel {
    pub const ALL: [Self; 4] = [Self::Whatsapp, Self::Email, Self::Sms, Self::Sse];

    /// Catalog ID of this channel.
    #[must_use]
    pub const fn type_id(self) -> NotificationTypeId {
        NotificationTypeId::new(match self {
            Self::Whatsapp => 1,
            Self::Email => 2,
            Self::Sms => 3,
            Self::Sse => 4,
        })
    }

    /// Look a channel up by catalog ID.
    #[must_use]
    pub const fn from_type_id(id: NotificationTypeId) -> Option<Self> {
        match id.as_i64() {
            1 => Some(Self::Whatsapp),
            2 => Some(Self::Email),
            3 => Some(Self::Sms),
            4 => Some(Self::Sse),
            _ => None,
        }
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Sse => "sse",
        }
    }
}

/// A notification channel catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationType {
    pub id: NotificationTypeId,
    pub code: String,
    pub name: String,
}

/// An event catalog row, mapping an ID to a canonical event code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEventType {
    pub id: EventTypeId,
    pub notification_type_id: NotificationTypeId,
    /// Canonical event code, e.g. `order.created`.
    pub event_code: String,
    pub name: String,
    pub description: Option<String>,
}

/// An order status catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub id: OrderStatusId,
    pub code: String,
    pub name: String,
}

/// A rule licensing one channel to fire on one event for a
/// business/integration pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: NotificationConfigId,
    pub business_id: BusinessId,
    pub integration_id: IntegrationId,
    pub notification_type_id: NotificationTypeId,
    pub event_type_id: EventTypeId,
    pub enabled: bool,
    pub description: String,
    /// Empty means every status.
    pub order_status_ids: Vec<OrderStatusId>,
    /// Empty means every payment method.
    pub payment_methods: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRule {
    /// The uniqueness key within a business/integration pair.
    #[must_use]
    pub const fn trigger(&self) -> (NotificationTypeId, EventTypeId) {
        (self.notification_type_id, self.event_type_id)
    }

    /// Whether this rule collides with another on the uniqueness key.
    #[must_use]
    pub fn collides_with(&self, other: &Self) -> bool {
        self.business_id == other.business_id
            && self.integration_id == other.integration_id
            && self.trigger() == other.trigger()
    }

    /// Evaluate the rule's conditions against an order.
    #[must_use]
    pub fn matches(&self, order: &RuleSubject) -> bool {
        let status_ok = self.order_status_ids.is_empty()
            || order
                .order_status_id
                .is_some_and(|id| self.order_status_ids.contains(&id));

        let payment_ok = self.payment_methods.is_empty()
            || order.payment_method.as_deref().is_some_and(|method| {
                self.payment_methods
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(method.trim()))
            });

        status_ok && payment_ok
    }
}

/// The parts of an order a rule's conditions look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSubject {
    pub order_status_id: Option<OrderStatusId>,
    pub payment_method: Option<String>,
}

/// A rule as stored in the routing cache.
///
/// `event_code` and `order_status_codes` are resolved at write time so
/// readers never join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRule {
    pub id: NotificationConfigId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<BusinessId>,
    pub integration_id: IntegrationId,
    pub notification_type_id: NotificationTypeId,
    pub event_type_id: EventTypeId,
    pub enabled: bool,
    pub description: String,
    #[serde(default)]
    pub order_status_ids: Vec<OrderStatusId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_status_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payment_methods: Vec<String>,
}

impl CachedRule {
    /// Denormalize a rule for caching.
    #[must_use]
    pub fn from_rule(
        rule: &NotificationRule,
        event_code: Option<String>,
        order_status_codes: Vec<String>,
    ) -> Self {
        Self {
            id: rule.id,
            business_id: Some(rule.business_id),
            integration_id: rule.integration_id,
            notification_type_id: rule.notification_type_id,
            event_type_id: rule.event_type_id,
            enabled: rule.enabled,
            description: rule.description.clone(),
            order_status_ids: rule.order_status_ids.clone(),
            event_code,
            order_status_codes,
            payment_methods: rule.payment_methods.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rule() -> NotificationRule {
        NotificationRule {
            id: NotificationConfigId::new(1),
            business_id: BusinessId::new(7),
            integration_id: IntegrationId::new(100),
            notification_type_id: NotificationTypeId::new(1),
            event_type_id: EventTypeId::new(5),
            enabled: true,
            description: "order created via whatsapp".to_string(),
            order_status_ids: vec![],
            payment_methods: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_channel_ids_roundtrip() {
        for channel in NotificationChannel::ALL {
            assert_eq!(
                NotificationChannel::from_type_id(channel.type_id()),
                Some(channel)
            );
        }
        assert!(NotificationChannel::from_type_id(NotificationTypeId::new(9)).is_none());
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let rule = rule();
        assert!(rule.matches(&RuleSubject::default()));
        assert!(rule.matches(&RuleSubject {
            order_status_id: Some(OrderStatusId::new(3)),
            payment_method: Some("cod".to_string()),
        }));
    }

    #[test]
    fn test_status_filter() {
        let mut rule = rule();
        rule.order_status_ids = vec![OrderStatusId::new(2)];

        assert!(rule.matches(&RuleSubject {
            order_status_id: Some(OrderStatusId::new(2)),
            ..Default::default()
        }));
        assert!(!rule.matches(&RuleSubject {
            order_status_id: Some(OrderStatusId::new(3)),
            ..Default::default()
        }));
        assert!(!rule.matches(&RuleSubject::default()));
    }

    #[test]
    fn test_payment_method_filter() {
        let mut rule = rule();
        rule.payment_methods = vec!["COD".to_string()];

        assert!(rule.matches(&RuleSubject {
            payment_method: Some(" cod ".to_string()),
            ..Default::default()
        }));
        assert!(!rule.matches(&RuleSubject {
            payment_method: Some("card".to_string()),
            ..Default::default()
        }));
    }

    #[test]
    fn test_collision_key() {
        let a = rule();
        let mut b = rule();
        b.id = NotificationConfigId::new(2);
        b.enabled = false;
        assert!(a.collides_with(&b));

        b.event_type_id = EventTypeId::new(6);
        assert!(!a.collides_with(&b));
    }

    #[test]
    fn test_cached_rule_serialization() {
        let cached = CachedRule::from_rule(&rule(), Some("order.created".to_string()), vec![]);
        let json = serde_json::to_value(&cached).unwrap();
        assert_eq!(json["event_code"], "order.created");
        assert_eq!(json["business_id"], 7);
        assert!(json.get("order_status_codes").is_none());

        let back: CachedRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, cached);
    }
}
