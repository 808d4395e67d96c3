//! Key-value store behind the notification cache.
//!
//! Only the hash and key-space commands the cache needs are exposed.
//! [`RedisKvStore`] is the production adapter; [`MemoryKvStore`] backs tests
//! and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by a key-value store.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store refused the operation.
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

/// Hash-oriented key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set one hash field.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError>;

    /// Remove one hash field.
    async fn hdel(&self, key: &str, field: &str) -> Result<(), KvError>;

    /// All fields of a hash; empty when the key does not exist.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError>;

    /// Delete whole keys. An empty list is a no-op.
    async fn del(&self, keys: &[String]) -> Result<(), KvError>;

    /// Keys matching a glob pattern (`*` wildcards only).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    /// Liveness check.
    async fn ping(&self) -> Result<(), KvError>;
}

// =============================================================================
// Redis
// =============================================================================

/// Redis-backed store over a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `KvError::Redis` if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(url: &SecretString) -> Result<Self, KvError> {
        let client = Client::open(url.expose_secret())?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(key, field).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn del(&self, keys: &[String]) -> Result<(), KvError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await?;
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

// =============================================================================
// Memory
// =============================================================================

/// In-memory store.
///
/// [`Self::set_failing`] makes every call fail and [`Self::reject_field`]
/// makes writes of one hash field fail, to exercise the cache's failure
/// tolerance.
#[derive(Default)]
pub struct MemoryKvStore {
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
    failing: AtomicBool,
    rejected_field: RwLock<Option<String>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `hset` of this field fail (`None` clears it).
    pub async fn reject_field(&self, field: Option<&str>) {
        *self.rejected_field.write().await = field.map(str::to_string);
    }

    /// Every key currently held, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.hashes.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn check(&self) -> Result<(), KvError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(KvError::Unavailable("memory store set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        self.check()?;
        if self.rejected_field.read().await.as_deref() == Some(field) {
            return Err(KvError::Unavailable(format!("write of field {field} rejected")));
        }
        self.hashes
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), KvError> {
        self.check()?;
        let mut hashes = self.hashes.write().await;
        if let Some(hash) = hashes.get_mut(key) {
            hash.remove(field);
            // Redis drops a hash with its last field.
            if hash.is_empty() {
                hashes.remove(key);
            }
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        self.check()?;
        Ok(self.hashes.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn del(&self, keys: &[String]) -> Result<(), KvError> {
        self.check()?;
        let mut hashes = self.hashes.write().await;
        for key in keys {
            hashes.remove(key);
        }
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.check()?;
        Ok(self
            .hashes
            .read()
            .await
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.check()
    }
}

/// Match `text` against a pattern where `*` matches any run of characters.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // No wildcard at all.
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = rest.get(pos + part.len()..).unwrap_or_default(),
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
