//! HMAC-SHA256 signatures used by the storefront.
//!
//! Webhook bodies are signed as base64; OAuth callback query strings are
//! signed as hex. Both comparisons run in constant time.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this never fails.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return Vec::new();
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Base64 HMAC-SHA256 of `body`, as sent in the webhook HMAC header.
#[must_use]
pub fn sign_webhook(secret: &[u8], body: &[u8]) -> String {
    STANDARD.encode(mac(secret, body))
}

/// Verify a base64 webhook signature over the exact raw body.
#[must_use]
pub fn verify_webhook(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(provided) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let expected = mac(secret, body);
    !expected.is_empty() && expected.ct_eq(&provided).into()
}

/// Hex HMAC-SHA256 of a query-string message.
#[must_use]
pub fn sign_query(secret: &[u8], message: &str) -> String {
    hex::encode(mac(secret, message.as_bytes()))
}

/// Verify a hex query-string signature.
#[must_use]
pub fn verify_query(secret: &[u8], message: &str, signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let expected = mac(secret, message.as_bytes());
    !expected.is_empty() && expected.ct_eq(&provided).into()
}
