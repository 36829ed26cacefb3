//! HMAC-SHA256 request signer
//!
//! `hex(HMAC_SHA256(secret, verb + path + nonce + body))`, computed over the
//! exact bytes that go on the wire.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verb signed by the realtime authentication handshake
pub const REALTIME_VERB: &str = "GET";
/// Path signed by the realtime authentication handshake
pub const REALTIME_PATH: &str = "/realtime";

/// Produce the hex-encoded signature for a request.
///
/// `path` must be the full path including any API version prefix.
pub fn sign(secret: &str, verb: &str, path: &str, nonce: u64, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(verb.as_bytes());
    mac.update(path.as_bytes());
    mac.update(nonce.to_string().as_bytes());
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
