//! Outbound realtime commands

use serde::Serialize;

use crate::auth::{Credentials, REALTIME_PATH, REALTIME_VERB};

/// Op name echoed back by the venue when authentication succeeds
pub const AUTH_OP: &str = "authKey";
/// Op name of subscribe requests; their arguments are topics
pub const SUBSCRIBE_OP: &str = "subscribe";

/// A command written to the socket as one JSON text frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "args", rename_all = "camelCase")]
pub enum Command {
    /// `{"op":"subscribe","args":"<topic>"}`
    Subscribe(String),
    /// `{"op":"authKey","args":["<key>",<nonce>,"<signature>"]}`
    AuthKey(String, u64, String),
}

impl Command {
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Command::Subscribe(topic.into())
    }

    /// Signed authentication command over `GET/realtime<nonce>`
    pub fn auth(credentials: &Credentials, nonce: u64) -> Self {
        let signature = credentials.sign(REALTIME_VERB, REALTIME_PATH, nonce, b"");
        Command::AuthKey(credentials.key().to_string(), nonce, signature)
    }

    /// Topic under which the acknowledgment of this command is awaited
    pub fn ack_topic(&self) -> &str {
        match self {
            Command::Subscribe(topic) => topic,
            Command::AuthKey(..) => AUTH_OP,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sign;

    #[test]
    fn test_subscribe_wire_format() {
        let json = Command::subscribe("trade:XBTUSD").to_json().unwrap();
        assert_eq!(json, r#"{"op":"subscribe","args":"trade:XBTUSD"}"#);
    }

    #[test]
    fn test_auth_wire_format() {
        let credentials = Credentials::new("my-key", "my-secret");
        let command = Command::auth(&credentials, 1500000000);
        let expected_sig = sign("my-secret", "GET", "/realtime", 1500000000, b"");

        let json = command.to_json().unwrap();
        assert_eq!(
            json,
            format!(
                r#"{{"op":"authKey","args":["my-key",1500000000,"{}"]}}"#,
                expected_sig
            )
        );
        assert_eq!(command.ack_topic(), "authKey");
    }
}
