//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `REDIS_URL` - Redis connection string for the notification cache
//! - `CREDENTIALS_KEY` - Symmetric key for integration credential encryption (high entropy)
//!
//! ## Optional
//! - `AMQP_URL` - `RabbitMQ` URL (absent or unreachable: orders are logged and dropped)
//! - `AMQP_EXCHANGE` - Topic exchange (default: storelink.events)
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8080)
//! - `ROUTE_PREFIX` - Prefix for all routes (default: empty)
//! - `FRONTEND_URL` - Host UI that receives the OAuth redirect (default: <http://localhost:3000>)
//! - `WEBHOOK_BASE_URL` - Public base URL for webhook callbacks (fallback: `URL_BASE_SWAGGER`)
//! - `APP_ENV` - `development` switches the derived redirect URI to plain http
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//! - `LOG_FORMAT` - `json` for structured logs
//!
//! ## Optional (storefront app)
//! - `SHOPIFY_CLIENT_ID` / `SHOPIFY_CLIENT_SECRET` - Default OAuth app (set together)
//! - `SHOPIFY_REDIRECT_URI` - OAuth redirect (default: derived from the request host)
//! - `SHOPIFY_SCOPES` - OAuth scopes
//! - `SHOPIFY_API_SECRET` - Fallback webhook HMAC secret
//! - `SHOPIFY_DEBUG` - `true`/`1` logs raw storefront requests

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const MIN_CREDENTIALS_KEY_LENGTH: usize = 32;

/// Scopes requested when `SHOPIFY_SCOPES` is unset.
pub const DEFAULT_SHOPIFY_SCOPES: &str =
    "read_orders,read_products,read_customers,read_fulfillments";

/// Exchange used when `AMQP_EXCHANGE` is unset.
pub const DEFAULT_AMQP_EXCHANGE: &str = "storelink.events";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// `PostgreSQL` connection URL (contains password)
    pub database_url: SecretString,
    /// Redis connection URL
    pub redis_url: SecretString,
    /// `RabbitMQ` connection URL
    pub amqp_url: Option<SecretString>,
    /// Topic exchange for orders and sync events
    pub amqp_exchange: String,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Prefix under which all routes are mounted (empty or `/something`)
    pub route_prefix: String,
    /// Host UI that receives the OAuth redirect
    pub frontend_url: String,
    /// Key for `pgp_sym_encrypt` on integration credentials
    pub credentials_key: SecretString,
    /// Storefront app configuration
    pub shopify: ShopifyAppConfig,
    /// Public base URL for webhook callbacks
    pub webhook_base_url: Option<String>,
    /// Deployment environment (`development`, `production`, ...)
    pub app_env: String,
    /// Emit JSON logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Storefront app configuration.
///
/// Implements `Debug` manually to redact the client and API secrets.
#[derive(Clone, Default)]
pub struct ShopifyAppConfig {
    /// Default OAuth client ID
    pub client_id: Option<String>,
    /// Default OAuth client secret
    pub client_secret: Option<SecretString>,
    /// Explicit OAuth redirect URI
    pub redirect_uri: Option<String>,
    /// Comma-separated OAuth scopes
    pub scopes: String,
    /// Fallback webhook HMAC secret
    pub api_secret: Option<SecretString>,
    /// Log raw storefront requests and responses
    pub debug: bool,
}

impl std::fmt::Debug for ShopifyAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyAppConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("debug", &self.debug)
            .finish()
    }
}

impl ShopifyAppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let client_id = get_optional_env("SHOPIFY_CLIENT_ID");
        let client_secret = get_optional_env("SHOPIFY_CLIENT_SECRET");

        let (client_id, client_secret) = match (client_id, client_secret) {
            (Some(id), Some(secret)) => (Some(id), Some(SecretString::from(secret))),
            (None, None) => (None, None),
            _ => {
                return Err(ConfigError::InvalidEnvVar(
                    "SHOPIFY_CLIENT_*".to_string(),
                    "Both SHOPIFY_CLIENT_ID and SHOPIFY_CLIENT_SECRET must be set together"
                        .to_string(),
                ));
            }
        };

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: get_optional_env("SHOPIFY_REDIRECT_URI"),
            scopes: get_env_or_default("SHOPIFY_SCOPES", DEFAULT_SHOPIFY_SCOPES),
            api_secret: get_optional_env("SHOPIFY_API_SECRET").map(SecretString::from),
            debug: get_optional_env("SHOPIFY_DEBUG").is_some_and(|v| is_truthy(&v)),
        })
    }

    /// Returns the default client credentials, if both are configured.
    #[must_use]
    pub fn default_credentials(&self) -> Option<(&str, &SecretString)> {
        Some((self.client_id.as_deref()?, self.client_secret.as_ref()?))
    }

    /// Scopes to request, falling back to the defaults when blank.
    #[must_use]
    pub fn scopes(&self) -> &str {
        if self.scopes.trim().is_empty() {
            DEFAULT_SHOPIFY_SCOPES
        } else {
            &self.scopes
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_required_secret("DATABASE_URL")?;
        let redis_url = get_required_secret("REDIS_URL")?;
        let amqp_url = get_optional_env("AMQP_URL").map(SecretString::from);
        let amqp_exchange = get_env_or_default("AMQP_EXCHANGE", DEFAULT_AMQP_EXCHANGE);

        let host = get_env_or_default("HOST", "0.0.0.0")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORT".to_string(), e.to_string()))?;
        let route_prefix = normalize_route_prefix(&get_env_or_default("ROUTE_PREFIX", ""));
        let frontend_url = get_env_or_default("FRONTEND_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();

        let credentials_key = get_validated_secret("CREDENTIALS_KEY")?;
        validate_key_length(&credentials_key, "CREDENTIALS_KEY")?;

        let shopify = ShopifyAppConfig::from_env()?;
        let webhook_base_url = get_optional_env("WEBHOOK_BASE_URL")
            .or_else(|| get_optional_env("URL_BASE_SWAGGER"))
            .filter(|v| !v.trim().is_empty());
        let app_env = get_env_or_default("APP_ENV", "production");
        let log_json = get_optional_env("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            database_url,
            redis_url,
            amqp_url,
            amqp_exchange,
            host,
            port,
            route_prefix,
            frontend_url,
            credentials_key,
            shopify,
            webhook_base_url,
            app_env,
            log_json,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the service runs in a development environment.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }

    /// OAuth redirect URI, derived from the request host when not configured.
    #[must_use]
    pub fn redirect_uri_for(&self, request_host: &str) -> String {
        if let Some(uri) = self.shopify.redirect_uri.as_deref().filter(|u| !u.is_empty()) {
            return uri.to_string();
        }
        let scheme = if self.is_development() { "http" } else { "https" };
        format!("{scheme}://{request_host}{}/shopify/callback", self.route_prefix)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

/// Normalize a route prefix to `""` or `/segment` without trailing slash.
fn normalize_route_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Validate that a key meets minimum length requirements.
fn validate_key_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_CREDENTIALS_KEY_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_CREDENTIALS_KEY_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            database_url: SecretString::from("postgres://localhost/storelink"),
            redis_url: SecretString::from("redis://localhost:6379"),
            amqp_url: None,
            amqp_exchange: DEFAULT_AMQP_EXCHANGE.to_string(),
            host: "127.0.0.1".parse().unwrap(),
            port: 8080,
            route_prefix: String::new(),
            frontend_url: "http://localhost:3000".to_string(),
            credentials_key: SecretString::from("k".repeat(32)),
            shopify: ShopifyAppConfig {
                scopes: DEFAULT_SHOPIFY_SCOPES.to_string(),
                ..Default::default()
            },
            webhook_base_url: None,
            app_env: "production".to_string(),
            log_json: false,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-credentials-key", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"a".repeat(40), "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_key_length() {
        assert!(validate_key_length(&SecretString::from("short"), "K").is_err());
        assert!(validate_key_length(&SecretString::from("a".repeat(32)), "K").is_ok());
    }

    #[test]
    fn test_normalize_route_prefix() {
        assert_eq!(normalize_route_prefix(""), "");
        assert_eq!(normalize_route_prefix("/"), "");
        assert_eq!(normalize_route_prefix("api/v1/"), "/api/v1");
        assert_eq!(normalize_route_prefix("/api"), "/api");
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("true"));
        assert!(is_truthy(" 1 "));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("yes"));
        assert!(!is_truthy("0"));
    }

    #[test]
    fn test_redirect_uri_derived() {
        let mut config = test_config();
        assert_eq!(
            config.redirect_uri_for("api.example.com"),
            "https://api.example.com/shopify/callback"
        );

        config.app_env = "development".to_string();
        config.route_prefix = "/api".to_string();
        assert_eq!(
            config.redirect_uri_for("localhost:8080"),
            "http://localhost:8080/api/shopify/callback"
        );

        config.shopify.redirect_uri = Some("https://fixed.example.com/cb".to_string());
        assert_eq!(
            config.redirect_uri_for("ignored"),
            "https://fixed.example.com/cb"
        );
    }

    #[test]
    fn test_scopes_default_when_blank() {
        let config = ShopifyAppConfig::default();
        assert_eq!(config.scopes(), DEFAULT_SHOPIFY_SCOPES);
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_shopify_config_debug_redacts_secrets() {
        let config = ShopifyAppConfig {
            client_id: Some("test_client_id".to_string()),
            client_secret: Some(SecretString::from("super_secret_client_secret")),
            api_secret: Some(SecretString::from("super_secret_api_secret")),
            ..Default::default()
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("test_client_id"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_client_secret"));
        assert!(!debug_output.contains("super_secret_api_secret"));
    }

    #[test]
    fn test_default_credentials_require_both() {
        let mut config = ShopifyAppConfig {
            client_id: Some("id".to_string()),
            ..Default::default()
        };
        assert!(config.default_credentials().is_none());

        config.client_secret = Some(SecretString::from("s"));
        let (id, _) = config.default_credentials().unwrap();
        assert_eq!(id, "id");
    }
}
