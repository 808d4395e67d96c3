//! HTTP middleware and extractors.

pub mod auth;

pub use auth::{CallerIdentity, HEADER_BUSINESS_ID, HEADER_USER_ID};
