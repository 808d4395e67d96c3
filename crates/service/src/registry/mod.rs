//! Integration registry.
//!
//! Storage sits behind [`IntegrationStore`] (`PostgreSQL` in production,
//! in-memory for tests). [`IntegrationRegistry`] adds the runtime and
//! observer tables on top: integration types bind their runtime at start-up
//! and observers are fired after every successful creation.
//!
//! Observers run synchronously on the creating task. An observer that needs
//! to do slow work (calling the storefront, say) must spawn it.

mod memory;
mod postgres;

pub use memory::MemoryIntegrationStore;
pub use postgres::PgIntegrationStore;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Map, Value};
use storelink_core::{BusinessId, Integration, IntegrationConfig, IntegrationId};
use thiserror::Error;
use tokio::sync::RwLock;

/// Credential field holding the storefront access token.
pub const ACCESS_TOKEN_FIELD: &str = "access_token";

/// Credential field holding the app's client secret.
pub const CLIENT_SECRET_FIELD: &str = "client_secret";

/// Credential field holding the app's client ID.
pub const CLIENT_ID_FIELD: &str = "client_id";

/// Errors raised by the registry and its stores.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No live integration matches.
    #[error("integration not found: {0}")]
    NotFound(String),

    /// The integration exists but has no such credential.
    #[error("integration {integration_id} has no credential '{field}'")]
    CredentialMissing {
        integration_id: IntegrationId,
        field: String,
    },

    /// A live integration already exists for this shop.
    #[error("integration already exists: {0}")]
    Conflict(String),

    /// The stored config does not fit the well-known keys.
    #[error("invalid integration config: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Input for creating an integration.
pub struct NewIntegration {
    pub business_id: Option<BusinessId>,
    pub name: String,
    pub code: Option<String>,
    pub integration_type: String,
    /// Normalized shop domain.
    pub external_id: String,
    pub config: IntegrationConfig,
    /// Plaintext credentials, encrypted by the store.
    pub credentials: Vec<(String, SecretString)>,
}

impl std::fmt::Debug for NewIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewIntegration")
            .field("business_id", &self.business_id)
            .field("name", &self.name)
            .field("integration_type", &self.integration_type)
            .field("external_id", &self.external_id)
            .field(
                "credentials",
                &self
                    .credentials
                    .iter()
                    .map(|(field, _)| field.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Persistence for integrations and their encrypted credentials.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Resolve a live integration by ID.
    async fn get_by_id(&self, id: IntegrationId) -> Result<Integration, RegistryError>;

    /// Resolve a live integration by shop domain and type tag.
    async fn get_by_external_id(
        &self,
        external_id: &str,
        integration_type: &str,
    ) -> Result<Integration, RegistryError>;

    /// Decrypt one named credential.
    async fn decrypt_credential(
        &self,
        id: IntegrationId,
        field: &str,
    ) -> Result<SecretString, RegistryError>;

    /// Shallow-merge `patch` into the stored config and return the result.
    async fn update_config(
        &self,
        id: IntegrationId,
        patch: &Map<String, Value>,
    ) -> Result<IntegrationConfig, RegistryError>;

    /// Persist a new integration with its credentials.
    async fn insert(&self, new: NewIntegration) -> Result<Integration, RegistryError>;

    /// Mark an integration as deleted.
    async fn soft_delete(&self, id: IntegrationId) -> Result<(), RegistryError>;

    /// Live integrations owned by a business.
    async fn list_for_business(
        &self,
        business_id: BusinessId,
    ) -> Result<Vec<Integration>, RegistryError>;

    /// Liveness check of the backing store.
    async fn ping(&self) -> Result<(), RegistryError>;
}

/// Per-type behaviour bound at start-up.
#[async_trait]
pub trait IntegrationRuntime: Send + Sync {
    /// Release whatever the integration registered at the storefront.
    ///
    /// Called before the record is soft-deleted. Failures are logged by the
    /// runtime and never block the removal.
    async fn teardown(&self, integration: &Integration);
}

/// Callback fired after an integration of a given type is created.
pub type IntegrationObserver = Arc<dyn Fn(&Integration) + Send + Sync>;

/// Integration lookups plus per-type runtimes and creation observers.
pub struct IntegrationRegistry {
    store: Arc<dyn IntegrationStore>,
    runtimes: RwLock<HashMap<String, Arc<dyn IntegrationRuntime>>>,
    observers: RwLock<HashMap<String, Vec<IntegrationObserver>>>,
}

impl IntegrationRegistry {
    /// Create a registry over a store.
    #[must_use]
    pub fn new(store: Arc<dyn IntegrationStore>) -> Self {
        Self {
            store,
            runtimes: RwLock::new(HashMap::new()),
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Bind the runtime for an integration type. Replaces any previous one.
    pub async fn register_integration(
        &self,
        integration_type: &str,
        runtime: Arc<dyn IntegrationRuntime>,
    ) {
        self.runtimes
            .write()
            .await
            .insert(integration_type.to_string(), runtime);
        tracing::debug!(integration_type, "Integration runtime registered");
    }

    /// Register a callback fired after every creation of this type.
    pub async fn register_observer_for_type(
        &self,
        integration_type: &str,
        observer: IntegrationObserver,
    ) {
        self.observers
            .write()
            .await
            .entry(integration_type.to_string())
            .or_default()
            .push(observer);
    }

    /// The runtime bound to a type, if any.
    pub async fn runtime(&self, integration_type: &str) -> Option<Arc<dyn IntegrationRuntime>> {
        self.runtimes.read().await.get(integration_type).cloned()
    }

    /// Resolve a live integration by ID.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if it does not exist or was deleted.
    pub async fn get_by_id(&self, id: IntegrationId) -> Result<Integration, RegistryError> {
        self.store.get_by_id(id).await
    }

    /// Resolve a live integration by shop domain.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if no live integration matches.
    pub async fn get_by_external_id(
        &self,
        external_id: &str,
        integration_type: &str,
    ) -> Result<Integration, RegistryError> {
        self.store
            .get_by_external_id(external_id, integration_type)
            .await
    }

    /// Decrypt a named credential.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for unknown integrations and
    /// `RegistryError::CredentialMissing` when the field is absent.
    pub async fn decrypt_credential(
        &self,
        id: IntegrationId,
        field: &str,
    ) -> Result<SecretString, RegistryError> {
        self.store.decrypt_credential(id, field).await
    }

    /// Shallow-merge a partial config.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for unknown integrations and
    /// `RegistryError::InvalidConfig` when the merge breaks a known key.
    pub async fn update_config(
        &self,
        id: IntegrationId,
        patch: &Map<String, Value>,
    ) -> Result<IntegrationConfig, RegistryError> {
        self.store.update_config(id, patch).await
    }

    /// Live integrations of a business.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Database` if the store fails.
    pub async fn list_for_business(
        &self,
        business_id: BusinessId,
    ) -> Result<Vec<Integration>, RegistryError> {
        self.store.list_for_business(business_id).await
    }

    /// Persist a new integration and fire the observers of its type.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Conflict` when the shop is already connected.
    #[tracing::instrument(skip(self, new), fields(shop = %new.external_id))]
    pub async fn create(&self, new: NewIntegration) -> Result<Integration, RegistryError> {
        let integration = self.store.insert(new).await?;
        tracing::info!(integration_id = %integration.id, "Integration created");

        let observers = self
            .observers
            .read()
            .await
            .get(&integration.integration_type)
            .cloned()
            .unwrap_or_default();
        for observer in observers {
            observer(&integration);
        }

        Ok(integration)
    }

    /// Tear down the integration's storefront state and soft-delete it.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if it does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, id: IntegrationId) -> Result<Integration, RegistryError> {
        let integration = self.store.get_by_id(id).await?;
        if let Some(runtime) = self.runtime(&integration.integration_type).await {
            runtime.teardown(&integration).await;
        }
        self.store.soft_delete(id).await?;
        tracing::info!(integration_id = %id, "Integration revoked");
        Ok(integration)
    }

    /// Liveness check of the backing store.
    ///
    /// # Errors
    ///
    /// Returns the store's error when it is unreachable.
    pub async fn ping(&self) -> Result<(), RegistryError> {
        self.store.ping().await
    }
}
