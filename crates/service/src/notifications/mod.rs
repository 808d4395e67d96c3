//! Notification routing: rule storage, the Redis-backed routing cache and the
//! use cases that keep the two coherent.
//!
//! Relational writes always go first. Cache writes follow and only log on
//! failure; the start-up warmup re-establishes consistency.

mod cache;
pub mod kv;
mod memory;
mod postgres;
pub mod repository;
mod service;

pub use cache::{
    CONFIGS_PREFIX, NotificationCache, WarmupReport, event_key, primary_key, reverse_key,
};
pub use kv::{KvError, KvStore, MemoryKvStore, RedisKvStore};
pub use memory::MemoryNotificationRepository;
pub use postgres::PgNotificationRepository;
pub use repository::{DUPLICATE_RULE, NewEventType, NewRule, NotificationRepository, RuleSyncPlan};
pub use service::{NotificationService, RulePatch, RuleInput, SyncSummary};

use storelink_core::NotificationConfigId;
use thiserror::Error;

use crate::db::RepositoryError;

/// Message returned when one batch carries the same trigger twice.
pub const DUPLICATE_IN_BATCH: &str = "duplicate-rule";

/// Errors raised by the notification use cases.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification config {0} not found")]
    RuleNotFound(NotificationConfigId),

    #[error("{0} not found")]
    NotFound(String),

    /// A rule with the same trigger already exists.
    #[error("{0}")]
    Conflict(String),

    /// Rejected input.
    #[error("{0}")]
    Validation(String),

    /// An event type still referenced by enabled rules.
    #[error("cannot delete event type: {count} active notification config(s) still use it")]
    EventTypeInUse { count: i64 },

    #[error(transparent)]
    Repository(RepositoryError),

    #[error(transparent)]
    Kv(#[from] KvError),
}

impl From<RepositoryError> for NotificationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => Self::Conflict(message),
            other => Self::Repository(other),
        }
    }
}
