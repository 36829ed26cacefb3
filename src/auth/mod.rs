//! Request authentication
//!
//! HMAC-SHA256 signing shared by the realtime handshake and the REST client,
//! plus the nonce sequencer both draw from.

mod nonce;
mod signer;

pub use nonce::NonceSequencer;
pub use signer::{sign, REALTIME_PATH, REALTIME_VERB};

use std::fmt;

/// API key and secret pair
#[derive(Clone)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    pub fn new(key: &str, secret: &str) -> Self {
        Self {
            key: key.to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Sign a request with this secret
    pub fn sign(&self, verb: &str, path: &str, nonce: u64, body: &[u8]) -> String {
        sign(&self.secret, verb, path, nonce, body)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}
