//! In-memory integration store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::{Map, Value};
use storelink_core::{BusinessId, Integration, IntegrationConfig, IntegrationId};
use tokio::sync::RwLock;

use super::{IntegrationStore, NewIntegration, RegistryError};

struct StoredIntegration {
    integration: Integration,
    credentials: HashMap<String, SecretString>,
    deleted: bool,
}

#[derive(Default)]
struct State {
    next_id: i64,
    rows: HashMap<IntegrationId, StoredIntegration>,
}

/// Integration store held in process memory.
#[derive(Default)]
pub struct MemoryIntegrationStore {
    state: RwLock<State>,
}

impl MemoryIntegrationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: IntegrationId) -> RegistryError {
    RegistryError::NotFound(format!("id {id}"))
}

#[async_trait]
impl IntegrationStore for MemoryIntegrationStore {
    async fn get_by_id(&self, id: IntegrationId) -> Result<Integration, RegistryError> {
        let state = self.state.read().await;
        state
            .rows
            .get(&id)
            .filter(|row| !row.deleted)
            .map(|row| row.integration.clone())
            .ok_or_else(|| not_found(id))
    }

    async fn get_by_external_id(
        &self,
        external_id: &str,
        integration_type: &str,
    ) -> Result<Integration, RegistryError> {
        let state = self.state.read().await;
        state
            .rows
            .values()
            .find(|row| {
                !row.deleted
                    && row.integration.external_id == external_id
                    && row.integration.integration_type == integration_type
            })
            .map(|row| row.integration.clone())
            .ok_or_else(|| RegistryError::NotFound(external_id.to_string()))
    }

    async fn decrypt_credential(
        &self,
        id: IntegrationId,
        field: &str,
    ) -> Result<SecretString, RegistryError> {
        let state = self.state.read().await;
        let row = state
            .rows
            .get(&id)
            .filter(|row| !row.deleted)
            .ok_or_else(|| not_found(id))?;

        row.credentials
            .get(field)
            .cloned()
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
        let mut state = self.state.write().await;
        let row = state
            .rows
            .get_mut(&id)
            .filter(|row| !row.deleted)
            .ok_or_else(|| not_found(id))?;

        let merged = row.integration.config.merged(patch)?;
        row.integration.config = merged.clone();
        row.integration.updated_at = Utc::now();
        Ok(merged)
    }

    async fn insert(&self, new: NewIntegration) -> Result<Integration, RegistryError> {
        let mut state = self.state.write().await;

        let taken = state.rows.values().any(|row| {
            !row.deleted
                && row.integration.external_id == new.external_id
                && row.integration.integration_type == new.integration_type
        });
        if taken {
            return Err(RegistryError::Conflict(new.external_id));
        }

        state.next_id += 1;
        let id = IntegrationId::new(state.next_id);
        let now = Utc::now();
        let integration = Integration {
            id,
            business_id: new.business_id,
            name: new.name,
            code: new.code,
            integration_type: new.integration_type,
            external_id: new.external_id,
            config: new.config,
            created_at: now,
            updated_at: now,
        };

        state.rows.insert(
            id,
            StoredIntegration {
                integration: integration.clone(),
                credentials: new.credentials.into_iter().collect(),
                deleted: false,
            },
        );
        Ok(integration)
    }

    async fn soft_delete(&self, id: IntegrationId) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let row = state
            .rows
            .get_mut(&id)
            .filter(|row| !row.deleted)
            .ok_or_else(|| not_found(id))?;
        row.deleted = true;
        Ok(())
    }

    async fn list_for_business(
        &self,
        business_id: BusinessId,
    ) -> Result<Vec<Integration>, RegistryError> {
        let state = self.state.read().await;
        let mut integrations: Vec<Integration> = state
            .rows
            .values()
            .filter(|row| !row.deleted && row.integration.business_id == Some(business_id))
            .map(|row| row.integration.clone())
            .collect();
        integrations.sort_by_key(|i| i.id);
        Ok(integrations)
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_integration() -> NewIntegration {
        NewIntegration {
            business_id: Some(BusinessId::new(7)),
            name: "Demo".to_string(),
            code: None,
            integration_type: "shopify".to_string(),
            external_id: "demo.myshopify.com".to_string(),
            config: IntegrationConfig {
                store_name: Some("demo.myshopify.com".to_string()),
                ..IntegrationConfig::default()
            },
            credentials: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_update_config_merges_shallowly() {
        let store = MemoryIntegrationStore::new();
        let created = store.insert(new_integration()).await.unwrap();

        let patch = json!({"webhook_ids": [1, 2], "custom": "kept"});
        let config = store
            .update_config(created.id, patch.as_object().unwrap())
            .await
            .unwrap();

        assert_eq!(config.store_name.as_deref(), Some("demo.myshopify.com"));
        assert_eq!(config.webhook_ids, vec![1, 2]);
        assert_eq!(config.extra["custom"], "kept");

        let reloaded = store.get_by_id(created.id).await.unwrap();
        assert_eq!(reloaded.config, config);
    }

    #[tokio::test]
    async fn test_update_config_rejects_bad_types() {
        let store = MemoryIntegrationStore::new();
        let created = store.insert(new_integration()).await.unwrap();

        let patch = json!({"webhook_ids": "nope"});
        let err = store
            .update_config(created.id, patch.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_list_for_business_skips_deleted() {
        let store = MemoryIntegrationStore::new();
        let created = store.insert(new_integration()).await.unwrap();
        assert_eq!(
            store
                .list_for_business(BusinessId::new(7))
                .await
                .unwrap()
                .len(),
            1
        );

        store.soft_delete(created.id).await.unwrap();
        assert!(
            store
                .list_for_business(BusinessId::new(7))
                .await
                .unwrap()
                .is_empty()
        );
        assert!(matches!(
            store.soft_delete(created.id).await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
