//! Short-lived single-use stores for OAuth state and token handoff.
//!
//! Both are process-local maps behind an async mutex. Expired entries are
//! purged lazily on every insert and ignored on take.

use std::collections::HashMap;
use std::time::Duration;

use rand::RngCore;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Number of random bytes in a generated key (hex-encoded to twice that).
const KEY_BYTES: usize = 32;

/// Generate a random hex key.
#[must_use]
pub fn random_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// Single-use map with a fixed time-to-live per entry.
pub struct ExpiringStore<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> ExpiringStore<T> {
    /// Create a store whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Time-to-live of new entries.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` under `key`, purging expired entries first.
    pub async fn insert(&self, key: String, value: T) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Store `value` under a fresh random key and return the key.
    pub async fn insert_random(&self, value: T) -> String {
        let key = random_key();
        self.insert(key.clone(), value).await;
        key
    }

    /// Remove and return the value if present and not expired.
    ///
    /// The entry is consumed either way.
    pub async fn take(&self, key: &str) -> Option<T> {
        let entry = self.entries.lock().await.remove(key)?;
        (entry.expires_at > Instant::now()).then_some(entry.value)
    }

    /// Number of entries currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
