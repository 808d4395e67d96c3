//! Integration entity and its structured configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::{BusinessId, IntegrationId};

/// Storefront domain suffix appended to bare shop names.
pub const SHOP_DOMAIN_SUFFIX: &str = ".myshopify.com";

/// A host-side record binding a business account to a shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    pub business_id: Option<BusinessId>,
    pub name: String,
    /// Derived slug, unique per creation (see `derive_integration_code`).
    pub code: Option<String>,
    pub integration_type: String,
    /// Normalized shop domain.
    pub external_id: String,
    pub config: IntegrationConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    /// The shop domain to call the storefront API with.
    ///
    /// Prefers the host of `store_url`, then `store_name`, then the
    /// integration name.
    #[must_use]
    pub fn shop_domain(&self) -> String {
        if let Some(url) = self.config.store_url.as_deref().filter(|u| !u.is_empty()) {
            let host = url
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/');
            if !host.is_empty() {
                return host.to_string();
            }
        }

        self.config
            .store_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Well-known integration config keys.
///
/// Keys not modelled here are kept in `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_configured: bool,
    #[serde(default)]
    pub webhook_ids: Vec<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IntegrationConfig {
    /// Shallow-merge a partial JSON object into this config.
    ///
    /// Top-level keys in `patch` replace existing keys; nested objects are
    /// not merged.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged object no longer fits the
    /// well-known key types (e.g. `webhook_ids` is not an array).
    pub fn merged(&self, patch: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut current = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            current.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(current))
    }
}

/// Normalize shop-domain input.
///
/// Lowercases, trims, strips the scheme and any path, and appends
/// `.myshopify.com` when no dot is present. Idempotent.
#[must_use]
pub fn normalize_shop_domain(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .trim();

    if host.is_empty() || host.contains('.') {
        host.to_string()
    } else {
        format!("{host}{SHOP_DOMAIN_SUFFIX}")
    }
}

/// Derive an integration code from a human name.
///
/// Lowercase, trim, whitespace to underscore, drop anything outside
/// `[a-z0-9_]`, then suffix with the given unix epoch.
#[must_use]
pub fn derive_integration_code(name: &str, epoch_secs: i64) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();

    format!("{slug}_{epoch_secs}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_shop_domain() {
        assert_eq!(normalize_shop_domain("demo"), "demo.myshopify.com");
        assert_eq!(
            normalize_shop_domain("  HTTPS://Demo.myshopify.com/admin "),
            "demo.myshopify.com"
        );
        assert_eq!(normalize_shop_domain("shop.example.com"), "shop.example.com");
    }

    #[test]
    fn test_normalize_shop_domain_idempotent() {
        let once = normalize_shop_domain("http://Demo");
        assert_eq!(normalize_shop_domain(&once), once);
    }

    #[test]
    fn test_derive_integration_code() {
        assert_eq!(
            derive_integration_code("  Mi Tienda #1 ", 1_700_000_000),
            "mi_tienda_1_1700000000"
        );
        assert_eq!(derive_integration_code("Café", 5), "caf_5");
    }

    #[test]
    fn test_config_preserves_unknown_keys() {
        let raw = json!({
            "store_name": "demo.myshopify.com",
            "webhook_ids": [1, 2],
            "theme": {"color": "red"}
        });
        let config: IntegrationConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.webhook_ids, vec![1, 2]);
        assert!(!config.webhook_configured);

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["theme"]["color"], "red");
    }

    #[test]
    fn test_config_shallow_merge() {
        let config = IntegrationConfig {
            store_name: Some("demo.myshopify.com".to_string()),
            webhook_ids: vec![1],
            ..Default::default()
        };

        let patch = json!({"webhook_ids": [7, 8], "webhook_configured": true});
        let merged = config.merged(patch.as_object().unwrap()).unwrap();

        assert_eq!(merged.webhook_ids, vec![7, 8]);
        assert!(merged.webhook_configured);
        assert_eq!(merged.store_name.as_deref(), Some("demo.myshopify.com"));
    }

    #[test]
    fn test_shop_domain_fallbacks() {
        let mut integration = Integration {
            id: IntegrationId::new(1),
            business_id: None,
            name: "fallback".to_string(),
            code: None,
            integration_type: "shopify".to_string(),
            external_id: "demo.myshopify.com".to_string(),
            config: IntegrationConfig::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(integration.shop_domain(), "fallback");

        integration.config.store_name = Some("demo.myshopify.com".to_string());
        assert_eq!(integration.shop_domain(), "demo.myshopify.com");

        integration.config.store_url = Some("https://other.myshopify.com/".to_string());
        assert_eq!(integration.shop_domain(), "other.myshopify.com");
    }
}
