//! WebSocket connection manager
//!
//! Owns the single realtime connection: connect, disconnect, serialized
//! writes, and the receive loop that feeds every frame to the router.
//! Nothing is retried; after a fatal condition the caller must connect again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, error::Elapsed};
use tracing::{debug, error, info, warn};

use super::client::{FrameReader, FrameWriter, WebSocketClient};
use crate::error::{BitmexError, Result};
use crate::router::MessageRouter;

/// Upper bound on waiting for the receive loop or a close frame during shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

type SharedWriter = Arc<Mutex<Option<FrameWriter>>>;

/// Observable lifecycle of the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Torn down by a fatal condition
    Failed(String),
}

struct Session {
    shutdown_tx: watch::Sender<bool>,
    reader: JoinHandle<()>,
}

/// Manages the realtime connection
pub struct ConnectionManager {
    writer: SharedWriter,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    session: Mutex<Option<Session>>,
    keepalive: Duration,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new(keepalive: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            writer: Arc::new(Mutex::new(None)),
            state_tx: Arc::new(state_tx),
            session: Mutex::new(None),
            keepalive,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Watch state transitions, e.g. to notice a fatal teardown
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connect and start the receive loop.
    ///
    /// Handshake failures are returned as-is; there is no retry.
    pub async fn connect(&self, endpoint: &str, router: Arc<MessageRouter>) -> Result<()> {
        let mut session = self.session.lock().await;

        if let Some(existing) = session.take() {
            let failed = matches!(self.state(), ConnectionState::Failed(_));
            if !failed && !existing.reader.is_finished() {
                *session = Some(existing);
                return Err(BitmexError::AlreadyConnected);
            }
            // A failed loop is already on its way out
            existing.reader.abort();
            debug!("Replacing finished session");
        }

        let (writer, reader) = WebSocketClient::new(endpoint).connect().await?;
        *self.writer.lock().await = Some(writer);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receive_loop = ReceiveLoop {
            reader,
            router,
            shutdown: shutdown_rx,
            writer: self.writer.clone(),
            state_tx: self.state_tx.clone(),
            keepalive: self.keepalive,
        };

        self.state_tx.send_replace(ConnectionState::Connected);
        let reader = tokio::spawn(receive_loop.run());

        *session = Some(Session {
            shutdown_tx,
            reader,
        });

        info!(endpoint = %endpoint, "Realtime connection established");
        Ok(())
    }

    /// Stop the receive loop and close the socket.
    ///
    /// Returns `NotConnected` when there is no session to close.
    pub async fn disconnect(&self) -> Result<()> {
        let session = self
            .session
            .lock()
            .await
            .take()
            .ok_or(BitmexError::NotConnected)?;

        info!("Disconnecting");

        // The loop checks this flag before treating a read failure as fatal
        let _ = session.shutdown_tx.send(true);

        // A writer stuck on a blocked socket may hold the lock; bound the wait
        if timeout(SHUTDOWN_TIMEOUT, close_writer(&self.writer)).await.is_err() {
            warn!("Timed out closing the write half");
        }

        let mut reader = session.reader;
        if timeout(SHUTDOWN_TIMEOUT, &mut reader).await.is_err() {
            warn!("Receive loop did not stop in time, aborting it");
            reader.abort();
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!("Disconnected");
        Ok(())
    }

    /// Write one text frame. Writers queue on the write lock; nothing is
    /// buffered.
    pub async fn send(&self, text: String) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(BitmexError::NotConnected)?;

        debug!(len = text.len(), "Writing frame");
        writer.send_text(text).await
    }
}

/// Take the write half out of service and send a close frame
async fn close_writer(writer: &SharedWriter) {
    if let Some(mut writer) = writer.lock().await.take() {
        writer.close().await;
    }
}

enum LoopEvent {
    Shutdown,
    Received(std::result::Result<Result<Option<String>>, Elapsed>),
}

/// Sole reader of the socket for one connection
struct ReceiveLoop {
    reader: FrameReader,
    router: Arc<MessageRouter>,
    shutdown: watch::Receiver<bool>,
    writer: SharedWriter,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    keepalive: Duration,
}

impl ReceiveLoop {
    async fn run(mut self) {
        debug!("Receive loop started");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.changed() => LoopEvent::Shutdown,
                received = timeout(self.keepalive, self.reader.recv()) => LoopEvent::Received(received),
            };

            match event {
                LoopEvent::Shutdown => {
                    debug!("Shutdown requested");
                    break;
                }
                LoopEvent::Received(Ok(Ok(Some(text)))) => {
                    // Frames are routed one at a time, in arrival order
                    if let Err(e) = self.router.route(&text).await {
                        self.fail(e).await;
                        break;
                    }
                }
                LoopEvent::Received(Ok(Ok(None))) => continue,
                LoopEvent::Received(Ok(Err(e))) => {
                    if self.shutting_down() {
                        debug!(error = %e, "Read ended by shutdown");
                        break;
                    }
                    self.fail(e).await;
                    break;
                }
                LoopEvent::Received(Err(_)) => {
                    debug!(idle_secs = self.keepalive.as_secs(), "Idle, sending keepalive ping");
                    if let Err(e) = self.ping().await {
                        if self.shutting_down() {
                            break;
                        }
                        self.fail(e).await;
                        break;
                    }
                }
            }
        }

        debug!("Receive loop stopped");
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn ping(&self) -> Result<()> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.ping().await,
            None => Err(BitmexError::NotConnected),
        }
    }

    /// Tear the connection down after a fatal condition
    async fn fail(&self, err: BitmexError) {
        error!(error = %err, "Fatal realtime error, closing connection");
        self.router.metrics().fatal_error();

        if timeout(SHUTDOWN_TIMEOUT, close_writer(&self.writer)).await.is_err() {
            warn!("Timed out closing the write half");
        }

        self.state_tx
            .send_replace(ConnectionState::Failed(err.to_string()));
        // Waiters observe Failed once their handles resolve
        self.router.abandon_pending().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let manager = ConnectionManager::new(Duration::from_secs(30));
        assert!(matches!(
            manager.disconnect().await,
            Err(BitmexError::NotConnected)
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_does_not_wait_on_a_stalled_writer() {
        let manager = ConnectionManager::new(Duration::from_secs(30));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let reader = tokio::spawn(async move {
            let _ = shutdown_rx.changed().await;
        });
        *manager.session.lock().await = Some(Session {
            shutdown_tx,
            reader,
        });
        manager.state_tx.send_replace(ConnectionState::Connected);

        // Stand-in for a write blocked on the socket
        let writer = manager.writer.clone();
        let _stalled = writer.lock().await;

        let result = timeout(SHUTDOWN_TIMEOUT * 3, manager.disconnect()).await;
        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let manager = ConnectionManager::new(Duration::from_secs(30));
        assert!(matches!(
            manager.send("{}".to_string()).await,
            Err(BitmexError::NotConnected)
        ));
    }
}
