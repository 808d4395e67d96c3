//! `PostgreSQL` notification repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use storelink_core::{
    BusinessId, EventTypeId, IntegrationId, NotificationConfigId, NotificationEventType,
    NotificationRule, NotificationType, NotificationTypeId, OrderStatus, OrderStatusId,
};

use super::repository::{DUPLICATE_RULE, NewEventType, NewRule, NotificationRepository, RuleSyncPlan};
use crate::db::RepositoryError;

/// Rule columns with the status filter folded into an array.
const RULE_SELECT: &str = "SELECT c.id, c.business_id, c.integration_id, c.notification_type_id, \
    c.event_type_id, c.enabled, c.description, c.payment_methods, c.created_at, c.updated_at, \
    COALESCE(array_agg(s.order_status_id ORDER BY s.order_status_id) \
        FILTER (WHERE s.order_status_id IS NOT NULL), '{}') AS order_status_ids \
    FROM notification_configs c \
    LEFT JOIN notification_config_order_statuses s ON s.notification_config_id = c.id";

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: i64,
    business_id: i64,
    integration_id: i64,
    notification_type_id: i64,
    event_type_id: i64,
    enabled: bool,
    description: String,
    payment_methods: Vec<String>,
    order_status_ids: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RuleRow> for NotificationRule {
    fn from(row: RuleRow) -> Self {
        Self {
            id: NotificationConfigId::new(row.id),
            business_id: BusinessId::new(row.business_id),
            integration_id: IntegrationId::new(row.integration_id),
            notification_type_id: NotificationTypeId::new(row.notification_type_id),
            event_type_id: EventTypeId::new(row.event_type_id),
            enabled: row.enabled,
            description: row.description,
            order_status_ids: row.order_status_ids.into_iter().map(OrderStatusId::new).collect(),
            payment_methods: row.payment_methods,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventTypeRow {
    id: i64,
    notification_type_id: i64,
    event_code: String,
    name: String,
    description: Option<String>,
}

impl From<EventTypeRow> for NotificationEventType {
    fn from(row: EventTypeRow) -> Self {
        Self {
            id: EventTypeId::new(row.id),
            notification_type_id: NotificationTypeId::new(row.notification_type_id),
            event_code: row.event_code,
            name: row.name,
            description: row.description,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CodeRow {
    id: i64,
    code: String,
    name: String,
}

/// Notification repository backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn ids<T, F: Fn(&T) -> i64>(items: &[T], f: F) -> Vec<i64> {
    items.iter().map(f).collect()
}

async fn fetch_rule(
    conn: &mut PgConnection,
    id: NotificationConfigId,
) -> Result<NotificationRule, RepositoryError> {
    let sql = format!("{RULE_SELECT} WHERE c.id = $1 GROUP BY c.id");
    sqlx::query_as::<_, RuleRow>(&sql)
        .bind(id.as_i64())
        .fetch_optional(conn)
        .await?
        .map(NotificationRule::from)
        .ok_or(RepositoryError::NotFound)
}

async fn replace_statuses(
    conn: &mut PgConnection,
    id: i64,
    statuses: &[OrderStatusId],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM notification_config_order_statuses WHERE notification_config_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if !statuses.is_empty() {
        sqlx::query(
            "INSERT INTO notification_config_order_statuses (notification_config_id, order_status_id) \
             SELECT $1, unnest($2::bigint[]) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(ids(statuses, OrderStatusId::as_i64))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_rule_in(conn: &mut PgConnection, new: &NewRule) -> Result<i64, RepositoryError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO notification_configs \
         (business_id, integration_id, notification_type_id, event_type_id, enabled, description, payment_methods) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
    )
    .bind(new.business_id.as_i64())
    .bind(new.integration_id.as_i64())
    .bind(new.notification_type_id.as_i64())
    .bind(new.event_type_id.as_i64())
    .bind(new.enabled)
    .bind(&new.description)
    .bind(&new.payment_methods)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_write(e, DUPLICATE_RULE))?;

    replace_statuses(conn, id, &new.order_status_ids).await?;
    Ok(id)
}

async fn update_rule_in(
    conn: &mut PgConnection,
    rule: &NotificationRule,
    scope: Option<(BusinessId, IntegrationId)>,
) -> Result<(), RepositoryError> {
    let (business_id, integration_id) =
        scope.unwrap_or((rule.business_id, rule.integration_id));

    let result = sqlx::query(
        "UPDATE notification_configs SET notification_type_id = $2, event_type_id = $3, \
         enabled = $4, description = $5, payment_methods = $6, updated_at = now() \
         WHERE id = $1 AND business_id = $7 AND integration_id = $8",
    )
    .bind(rule.id.as_i64())
    .bind(rule.notification_type_id.as_i64())
    .bind(rule.event_type_id.as_i64())
    .bind(rule.enabled)
    .bind(&rule.description)
    .bind(&rule.payment_methods)
    .bind(business_id.as_i64())
    .bind(integration_id.as_i64())
    .execute(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_write(e, DUPLICATE_RULE))?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    replace_statuses(conn, rule.id.as_i64(), &rule.order_status_ids).await
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn list_types(&self) -> Result<Vec<NotificationType>, RepositoryError> {
        let rows = sqlx::query_as::<_, CodeRow>(
            "SELECT id, code, name FROM notification_types ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| NotificationType {
                id: NotificationTypeId::new(r.id),
                code: r.code,
                name: r.name,
            })
            .collect())
    }

    async fn list_event_types(
        &self,
        notification_type_id: Option<NotificationTypeId>,
    ) -> Result<Vec<NotificationEventType>, RepositoryError> {
        let rows = sqlx::query_as::<_, EventTypeRow>(
            "SELECT id, notification_type_id, event_code, name, description \
             FROM notification_event_types \
             WHERE $1::bigint IS NULL OR notification_type_id = $1 \
             ORDER BY id",
        )
        .bind(notification_type_id.map(|id| id.as_i64()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_event_type(
        &self,
        id: EventTypeId,
    ) -> Result<NotificationEventType, RepositoryError> {
        sqlx::query_as::<_, EventTypeRow>(
            "SELECT id, notification_type_id, event_code, name, description \
             FROM notification_event_types WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .map(Into::into)
        .ok_or(RepositoryError::NotFound)
    }

    async fn create_event_type(
        &self,
        new: &NewEventType,
    ) -> Result<NotificationEventType, RepositoryError> {
        let row = sqlx::query_as::<_, EventTypeRow>(
            "INSERT INTO notification_event_types (notification_type_id, event_code, name, description) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, notification_type_id, event_code, name, description",
        )
        .bind(new.notification_type_id.as_i64())
        .bind(&new.event_code)
        .bind(&new.name)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "event type already exists for this channel"))?;

        Ok(row.into())
    }

    async fn delete_event_type(&self, id: EventTypeId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM notification_event_types WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn count_enabled_rules_for_event(
        &self,
        id: EventTypeId,
    ) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_configs WHERE event_type_id = $1 AND enabled",
        )
        .bind(id.as_i64())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_order_statuses(&self) -> Result<Vec<OrderStatus>, RepositoryError> {
        let rows =
            sqlx::query_as::<_, CodeRow>("SELECT id, code, name FROM order_statuses ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|r| OrderStatus {
                id: OrderStatusId::new(r.id),
                code: r.code,
                name: r.name,
            })
            .collect())
    }

    async fn order_status_codes(
        &self,
        ids: &[OrderStatusId],
    ) -> Result<HashMap<OrderStatusId, String>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, code FROM order_statuses WHERE id = ANY($1)")
                .bind(self::ids(ids, OrderStatusId::as_i64))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, code)| (OrderStatusId::new(id), code))
            .collect())
    }

    async fn event_codes(
        &self,
        ids: &[EventTypeId],
    ) -> Result<HashMap<EventTypeId, String>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, event_code FROM notification_event_types WHERE id = ANY($1)")
                .bind(self::ids(ids, EventTypeId::as_i64))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, code)| (EventTypeId::new(id), code))
            .collect())
    }

    async fn get_rule(
        &self,
        id: NotificationConfigId,
    ) -> Result<NotificationRule, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_rule(&mut conn, id).await
    }

    async fn list_rules(
        &self,
        business_id: BusinessId,
        integration_id: Option<IntegrationId>,
    ) -> Result<Vec<NotificationRule>, RepositoryError> {
        let sql = format!(
            "{RULE_SELECT} WHERE c.business_id = $1 AND ($2::bigint IS NULL OR c.integration_id = $2) \
             GROUP BY c.id ORDER BY c.id"
        );
        let rows = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(business_id.as_i64())
            .bind(integration_id.map(|id| id.as_i64()))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_enabled_rules(&self) -> Result<Vec<NotificationRule>, RepositoryError> {
        let sql = format!("{RULE_SELECT} WHERE c.enabled GROUP BY c.id ORDER BY c.id");
        let rows = sqlx::query_as::<_, RuleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_rules_for_event(
        &self,
        event_type_id: EventTypeId,
    ) -> Result<Vec<NotificationRule>, RepositoryError> {
        let sql = format!("{RULE_SELECT} WHERE c.event_type_id = $1 GROUP BY c.id ORDER BY c.id");
        let rows = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(event_type_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_by_trigger(
        &self,
        business_id: BusinessId,
        integration_id: IntegrationId,
        notification_type_id: NotificationTypeId,
        event_type_id: EventTypeId,
    ) -> Result<Option<NotificationRule>, RepositoryError> {
        let sql = format!(
            "{RULE_SELECT} WHERE c.business_id = $1 AND c.integration_id = $2 \
             AND c.notification_type_id = $3 AND c.event_type_id = $4 GROUP BY c.id"
        );
        let row = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(business_id.as_i64())
            .bind(integration_id.as_i64())
            .bind(notification_type_id.as_i64())
            .bind(event_type_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_rule(&self, new: &NewRule) -> Result<NotificationRule, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_rule_in(&mut tx, new).await?;
        let rule = fetch_rule(&mut tx, NotificationConfigId::new(id)).await?;
        tx.commit()
            .await
            .map_err(|e| RepositoryError::from_write(e, DUPLICATE_RULE))?;
        Ok(rule)
    }

    async fn update_rule(
        &self,
        rule: &NotificationRule,
    ) -> Result<NotificationRule, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        update_rule_in(&mut tx, rule, None).await?;
        let updated = fetch_rule(&mut tx, rule.id).await?;
        tx.commit()
            .await
            .map_err(|e| RepositoryError::from_write(e, DUPLICATE_RULE))?;
        Ok(updated)
    }

    async fn delete_rule(&self, id: NotificationConfigId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM notification_configs WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn sync_rules(
        &self,
        business_id: BusinessId,
        integration_id: IntegrationId,
        plan: &RuleSyncPlan,
    ) -> Result<Vec<NotificationRule>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let touched: Vec<i64> = plan
            .delete
            .iter()
            .map(NotificationConfigId::as_i64)
            .chain(plan.update.iter().map(|r| r.id.as_i64()))
            .collect();
        sqlx::query(
            "DELETE FROM notification_config_order_statuses WHERE notification_config_id = ANY($1)",
        )
        .bind(&touched)
        .execute(&mut *tx)
        .await?;

        if !plan.delete.is_empty() {
            sqlx::query(
                "DELETE FROM notification_configs \
                 WHERE id = ANY($1) AND business_id = $2 AND integration_id = $3",
            )
            .bind(ids(&plan.delete, NotificationConfigId::as_i64))
            .bind(business_id.as_i64())
            .bind(integration_id.as_i64())
            .execute(&mut *tx)
            .await?;
        }

        for new in &plan.create {
            insert_rule_in(&mut tx, new).await?;
        }

        for rule in &plan.update {
            update_rule_in(&mut tx, rule, Some((business_id, integration_id))).await?;
        }

        // The trigger key is deferred, so collisions surface here.
        tx.commit()
            .await
            .map_err(|e| RepositoryError::from_write(e, DUPLICATE_RULE))?;

        self.list_rules(business_id, Some(integration_id)).await
    }
}
