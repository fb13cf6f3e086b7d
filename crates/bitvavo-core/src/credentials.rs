//! API credentials and HMAC-SHA256 request signing.
//!
//! Every authenticated request (REST call or WebSocket `authenticate`
//! action) carries a signature computed as
//! `hex(HMAC-SHA256(secret, timestamp + method + path + body))`.

use crate::error::{CoreError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Default validity window for signed requests (ms).
pub const DEFAULT_WINDOW_MS: u64 = 10_000;

/// Maximum validity window accepted by the venue (ms).
pub const MAX_WINDOW_MS: u64 = 60_000;

/// Path signed by the WebSocket `authenticate` action.
const WEBSOCKET_AUTH_PATH: &str = "/v2/websocket";

/// API key and secret.
///
/// The secret is zeroized on drop and never printed.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: Zeroizing<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Create credentials, rejecting empty key or secret.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        let api_secret = Zeroizing::new(api_secret.into());

        if api_key.trim().is_empty() {
            return Err(CoreError::InvalidCredentials("empty API key".to_string()));
        }
        if api_secret.trim().is_empty() {
            return Err(CoreError::InvalidCredentials("empty API secret".to_string()));
        }

        Ok(Self {
            api_key,
            api_secret,
        })
    }

    /// Public API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Sign `timestamp + method + path + body`.
    pub fn sign(&self, timestamp: i64, method: &str, path: &str, body: &str) -> Result<String> {
        let message = format!("{timestamp}{method}{path}{body}");
        hmac_sha256_hex(self.api_secret.as_bytes(), &message)
    }

    /// Signature for the WebSocket `authenticate` action.
    pub fn sign_websocket(&self, timestamp: i64) -> Result<String> {
        self.sign(timestamp, "GET", WEBSOCKET_AUTH_PATH, "")
    }
}

/// HMAC-SHA256 of `message` keyed by `secret`, lowercase hex encoded.
pub fn hmac_sha256_hex(secret: &[u8], message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| CoreError::Signing(format!("Failed to create HMAC: {e}")))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
