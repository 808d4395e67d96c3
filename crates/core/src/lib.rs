//! Storelink Core - Shared domain types.
//!
//! This crate provides the types that flow between the storelink components:
//! - `service` - Webhook ingestion, OAuth broker, bulk sync and notification routing
//! - `cli` - Migrations and operational commands
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, the canonical order contract, integrations,
//!   notification rules and bus event envelopes

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
