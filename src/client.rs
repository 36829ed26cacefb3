//! Realtime client facade
//!
//! Ties the connection manager, router, registry and auth handshake together
//! behind one handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::ack::{AckHandle, PendingAcks};
use crate::auth::{Credentials, NonceSequencer};
use crate::command::Command;
use crate::config::Config;
use crate::error::{BitmexError, Result};
use crate::metrics::StreamMetrics;
use crate::parser::{EventKind, Record};
use crate::router::MessageRouter;
use crate::subscription::{EventSink, SinkId, Subscription, SubscriptionRegistry};
use crate::websocket::{ConnectionManager, ConnectionState};

/// Multiplexed realtime client
pub struct RealtimeClient {
    endpoint: String,
    connection: ConnectionManager,
    router: Arc<MessageRouter>,
    registry: Arc<SubscriptionRegistry>,
    acks: Arc<PendingAcks>,
    metrics: Arc<StreamMetrics>,
    nonce: Arc<NonceSequencer>,
    credentials: RwLock<Option<Credentials>>,
}

impl RealtimeClient {
    /// Create a client with its own clock-seeded nonce sequencer
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_nonce(config, Arc::new(NonceSequencer::from_clock()))
    }

    /// Create a client drawing nonces from a shared sequencer
    pub fn with_nonce(config: &Config, nonce: Arc<NonceSequencer>) -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let acks = Arc::new(PendingAcks::new());
        let metrics = Arc::new(StreamMetrics::new()?);
        let router = Arc::new(MessageRouter::new(
            registry.clone(),
            acks.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            endpoint: config.ws_endpoint.clone(),
            connection: ConnectionManager::new(Duration::from_secs(
                config.keepalive_interval_secs.max(1),
            )),
            router,
            registry,
            acks,
            metrics,
            nonce,
            credentials: RwLock::new(None),
        })
    }

    /// Open the connection and start the receive loop
    pub async fn connect(&self) -> Result<()> {
        self.connection
            .connect(&self.endpoint, self.router.clone())
            .await
    }

    /// Close the connection.
    ///
    /// Registrations and pending acknowledgments do not survive a
    /// disconnect; subscribe again after reconnecting.
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await?;

        let removed = self.registry.clear().await;
        self.acks.clear().await;
        debug!(removed, "Cleared registrations");
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    pub fn nonce(&self) -> &Arc<NonceSequencer> {
        &self.nonce
    }

    /// Register `sink` for `R` records of the given instruments and
    /// subscribe the matching topics.
    pub async fn subscribe<R, S, I>(&self, sink: S, symbols: I) -> Result<Subscription>
    where
        R: Record,
        S: EventSink<R> + 'static,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let kind = R::KIND;
        let filter: Vec<String> = symbols.into_iter().map(Into::into).collect();
        let topics = subscribe_topics(kind, &filter);

        let sink: Arc<dyn EventSink<R>> = Arc::new(sink);
        let id = self.registry.register(sink, filter).await;

        match self.issue_subscribe(&topics).await {
            Ok(acks) => {
                info!(kind = %kind, sink = %id, topics = ?topics, "Subscribed");
                Ok(Subscription { id, acks })
            }
            Err(e) => {
                self.registry.kind::<R>().remove(id).await;
                Err(e)
            }
        }
    }

    /// Register `sink` for every `R` record regardless of instrument
    pub async fn subscribe_all<R, S>(&self, sink: S) -> Result<Subscription>
    where
        R: Record,
        S: EventSink<R> + 'static,
    {
        self.subscribe(sink, Vec::<String>::new()).await
    }

    /// Add instruments to an existing registration and subscribe them.
    ///
    /// The filter is appended to, never replaced.
    pub async fn extend<R, I>(&self, id: SinkId, symbols: I) -> Result<Subscription>
    where
        R: Record,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let added: Vec<String> = symbols.into_iter().map(Into::into).collect();

        if !self.registry.kind::<R>().extend(id, added.clone()).await {
            return Err(BitmexError::UnknownSink(id.value()));
        }

        // Private topics are already subscribed as a whole
        let topics = if R::KIND.is_private() || added.is_empty() {
            Vec::new()
        } else {
            subscribe_topics(R::KIND, &added)
        };

        let acks = self.issue_subscribe(&topics).await?;
        Ok(Subscription { id, acks })
    }

    /// Stop delivering to a sink. No unsubscribe command is sent.
    pub async fn unregister<R: Record>(&self, id: SinkId) -> bool {
        self.registry.kind::<R>().remove(id).await
    }

    /// Send the signed `authKey` command.
    ///
    /// The returned handle completes when the venue acknowledges it.
    pub async fn authenticate(&self, key: &str, secret: &str) -> Result<AckHandle> {
        self.authenticate_with(Credentials::new(key, secret)).await
    }

    pub async fn authenticate_with(&self, credentials: Credentials) -> Result<AckHandle> {
        let nonce = self.nonce.next();
        let command = Command::auth(&credentials, nonce);
        *self.credentials.write().await = Some(credentials);

        let ack = self.acks.register(command.ack_topic()).await;
        self.send_command(&command).await?;

        info!(nonce, "Authentication requested");
        Ok(ack)
    }

    /// Credentials stored by the last `authenticate` call
    pub async fn credentials(&self) -> Option<Credentials> {
        self.credentials.read().await.clone()
    }

    async fn issue_subscribe(&self, topics: &[String]) -> Result<Vec<AckHandle>> {
        let mut acks = Vec::with_capacity(topics.len());
        for topic in topics {
            let command = Command::subscribe(topic.as_str());
            let (ack, needs_request) = self.acks.request_topic(command.ack_topic()).await;
            acks.push(ack);

            if !needs_request {
                debug!(topic = %topic, "Topic already subscribed or in flight");
                continue;
            }
            self.send_command(&command).await?;
        }
        Ok(acks)
    }

    /// Write a command whose waiters are already registered. A failed write
    /// rejects them, since no acknowledgment can follow.
    async fn send_command(&self, command: &Command) -> Result<()> {
        let sent = match command.to_json() {
            Ok(text) => self.connection.send(text).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &sent {
            self.acks.reject(command.ack_topic(), &e.to_string()).await;
        }
        sent
    }
}

/// Topics to subscribe for a filter: one per symbol for public kinds, the
/// bare table otherwise.
fn subscribe_topics(kind: EventKind, filter: &[String]) -> Vec<String> {
    if kind.is_private() || filter.is_empty() {
        return vec![kind.topic(None)];
    }

    let mut topics: Vec<String> = Vec::with_capacity(filter.len());
    for symbol in filter {
        let topic = kind.topic(Some(symbol));
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    }
    topics
}
