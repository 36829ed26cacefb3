//! Error types for the realtime client

use thiserror::Error;

/// Realtime client errors
#[derive(Error, Debug)]
pub enum BitmexError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Unrecognized frame: {0}")]
    UnrecognizedFrame(String),

    #[error("REST API error: {0}")]
    RestApiError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Missing API credentials")]
    MissingCredentials,

    #[error("Request for {topic} rejected: {reason}")]
    Rejected { topic: String, reason: String },

    #[error("Acknowledgment for {0} was dropped before completion")]
    AckDropped(String),

    #[error("Sink {0} is not registered")]
    UnknownSink(u64),
}

impl BitmexError {
    /// Whether this error terminates the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BitmexError::UnrecognizedFrame(_)
                | BitmexError::WebSocketConnection(_)
                | BitmexError::WebSocketMessage(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BitmexError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BitmexError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for BitmexError {
    fn from(err: serde_json::Error) -> Self {
        BitmexError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for BitmexError {
    fn from(err: reqwest::Error) -> Self {
        BitmexError::RestApiError(err.to_string())
    }
}

impl From<prometheus::Error> for BitmexError {
    fn from(err: prometheus::Error) -> Self {
        BitmexError::MetricsError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BitmexError>;
