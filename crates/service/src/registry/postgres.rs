//! `PostgreSQL` integration store.
//!
//! Credentials are encrypted at rest with `pgcrypto` (`pgp_sym_encrypt`)
//! under the service's `CREDENTIALS_KEY`; plaintext never leaves the
//! process except through [`IntegrationStore::decrypt_credential`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;
use storelink_core::{BusinessId, Integration, IntegrationConfig, IntegrationId};

use super::{IntegrationStore, NewIntegration, RegistryError};

const INTEGRATION_COLUMNS: &str = "id, business_id, name, code, integration_type, external_id, \
                                   config, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct IntegrationRow {
    id: i64,
    business_id: Option<i64>,
    name: String,
    code: Option<String>,
    integration_type: String,
    external_id: String,
    config: Json<IntegrationConfig>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<IntegrationRow> for Integration {
    fn from(row: IntegrationRow) -> Self {
        Self {
            id: IntegrationId::new(row.id),
            business_id: row.business_id.map(BusinessId::new),
            name: row.name,
            code: row.code,
            integration_type: row.integration_type,
            external_id: row.external_id,
            config: row.config.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Integration store backed by `PostgreSQL`.
pub struct PgIntegrationStore {
    pool: PgPool,
    credentials_key: SecretString,
}

impl PgIntegrationStore {
    /// Create a new store.
    #[must_use]
    pub const fn new(pool: PgPool, credentials_key: SecretString) -> Self {
        Self {
            pool,
            credentials_key,
        }
    }
}

fn not_found(id: IntegrationId) -> RegistryError {
    RegistryError::NotFound(format!("id {id}"))
}

#[async_trait]
impl IntegrationStore for PgIntegrationStore {
    async fn get_by_id(&self, id: IntegrationId) -> Result<Integration, RegistryError> {
        let sql = format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Integration::from)
            .ok_or_else(|| not_found(id))
    }

    async fn get_by_external_id(
        &self,
        external_id: &str,
        integration_type: &str,
    ) -> Result<Integration, RegistryError> {
        let sql = format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations \
             WHERE external_id = $1 AND integration_type = $2 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(external_id)
            .bind(integration_type)
            .fetch_optional(&self.pool)
            .await?
            .map(Integration::from)
            .ok_or_else(|| RegistryError::NotFound(external_id.to_string()))
    }

    async fn decrypt_credential(
        &self,
        id: IntegrationId,
        field: &str,
    ) -> Result<SecretString, RegistryError> {
        // Distinguish an unknown integration from a missing field.
        self.get_by_id(id).await?;

        let plaintext: Option<String> = sqlx::query_scalar(
            r"
            SELECT pgp_sym_decrypt(secret, $3)
            FROM integration_credentials
            WHERE integration_id = $1 AND field = $2
            ",
        )
        .bind(id.as_i64())
        .bind(field)
        .bind(self.credentials_key.expose_secret())
        .fetch_optional(&self.pool)
        .await?;

        plaintext
            .map(SecretString::from)
            .ok_or_else(|| RegistryError::CredentialMissing {
                integration_id: id,
                field: field.to_string(),
            })
    }

    async fn update_config(
        &self,
        id: IntegrationId,
        patch: &Map<String, Value>,
    ) -> Result<IntegrationConfig, RegistryError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Json<IntegrationConfig>> = sqlx::query_scalar(
            "SELECT config FROM integrations WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;
        let current = current.ok_or_else(|| not_found(id))?;

        let merged = current.0.merged(patch)?;

        sqlx::query("UPDATE integrations SET config = $2, updated_at = now() WHERE id = $1")
            .bind(id.as_i64())
            .bind(Json(&merged))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(merged)
    }

    async fn insert(&self, new: NewIntegration) -> Result<Integration, RegistryError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO integrations (business_id, name, code, integration_type, external_id, config) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {INTEGRATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(new.business_id.map(|b| b.as_i64()))
            .bind(&new.name)
            .bind(&new.code)
            .bind(&new.integration_type)
            .bind(&new.external_id)
            .bind(Json(&new.config))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    RegistryError::Conflict(new.external_id.clone())
                }
                _ => RegistryError::Database(e),
            })?;

        for (field, secret) in &new.credentials {
            sqlx::query(
                r"
                INSERT INTO integration_credentials (integration_id, field, secret)
                VALUES ($1, $2, pgp_sym_encrypt($3, $4))
                ",
            )
            .bind(row.id)
            .bind(field)
            .bind(secret.expose_secret())
            .bind(self.credentials_key.expose_secret())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row.into())
    }

    async fn soft_delete(&self, id: IntegrationId) -> Result<(), RegistryError> {
        let result = sqlx::query(
            "UPDATE integrations SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn list_for_business(
        &self,
        business_id: BusinessId,
    ) -> Result<Vec<Integration>, RegistryError> {
        let sql = format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations \
             WHERE business_id = $1 AND deleted_at IS NULL ORDER BY id"
        );
        let rows = sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(business_id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Integration::from).collect())
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
