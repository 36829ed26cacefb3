//! WebSocket client for the realtime endpoint
//!
//! Handles the handshake and splits the socket into a write half and a read
//! half so the receive loop can own reading while writers share the other
//! half behind a lock.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};

use crate::error::{BitmexError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to one realtime endpoint
pub struct WebSocketClient {
    endpoint: String,
}

impl WebSocketClient {
    /// Create a new WebSocket client
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
        }
    }

    /// Perform the handshake and split the connection
    pub async fn connect(&self) -> Result<(FrameWriter, FrameReader)> {
        info!(url = %self.endpoint, "Connecting to realtime WebSocket");

        let (ws_stream, response) = connect_async(self.endpoint.as_str()).await.map_err(|e| {
            BitmexError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");

        let (sink, stream) = ws_stream.split();
        Ok((FrameWriter { sink }, FrameReader { stream }))
    }
}

/// Write half of the connection
pub struct FrameWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter {
    /// Write one text frame
    pub async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| BitmexError::WebSocketMessage(e.to_string()))
    }

    /// Send a ping to keep connection alive
    pub async fn ping(&mut self) -> Result<()> {
        self.sink
            .send(Message::Ping(vec![]))
            .await
            .map_err(|e| BitmexError::WebSocketMessage(e.to_string()))
    }

    /// Send a close frame
    pub async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "Error while closing WebSocket");
        }
    }
}

/// Read half of the connection, owned by the receive loop
pub struct FrameReader {
    stream: SplitStream<WsStream>,
}

impl FrameReader {
    /// Receive the next text frame.
    ///
    /// `Ok(None)` means a control frame was consumed and there is nothing to
    /// route. Failures are only logged at debug level here; the receive loop
    /// decides whether they are fatal.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => {
                // Convert binary to text if needed
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Some(text))
            }
            Some(Ok(Message::Ping(_))) => {
                // tungstenite answers pings itself
                debug!("Received ping");
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(frame = ?frame, "Received close frame");
                Err(BitmexError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                debug!(error = %e, "WebSocket read error");
                Err(BitmexError::WebSocketMessage(e.to_string()))
            }
            None => {
                debug!("WebSocket stream ended");
                Err(BitmexError::WebSocketConnection(
                    "Stream ended".to_string(),
                ))
            }
        }
    }
}
