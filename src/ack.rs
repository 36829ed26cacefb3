//! Pending acknowledgments of subscribe and auth commands
//!
//! Each waiter holds a one-shot receiver. Resolving a topic takes every
//! waiter registered under it out of the table, so a signal fires at most
//! once. Confirmed subscribe topics are remembered until the connection ends
//! so each topic is written to the venue once.

use std::collections::{HashMap, HashSet};

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::error::{BitmexError, Result};

type AckOutcome = std::result::Result<(), String>;

/// Completion signal for one command
#[derive(Debug)]
pub struct AckHandle {
    topic: String,
    rx: oneshot::Receiver<AckOutcome>,
}

impl AckHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the venue's answer
    pub async fn acknowledged(self) -> Result<()> {
        match self.rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(BitmexError::Rejected {
                topic: self.topic,
                reason,
            }),
            Err(_) => Err(BitmexError::AckDropped(self.topic)),
        }
    }
}

#[derive(Default)]
struct AckTable {
    waiters: HashMap<String, Vec<oneshot::Sender<AckOutcome>>>,
    /// Topics the venue confirmed on the current connection
    active: HashSet<String>,
}

/// Waiters keyed by topic, plus the topics already subscribed
#[derive(Default)]
pub struct PendingAcks {
    table: Mutex<AckTable>,
}

impl PendingAcks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter. Call before the command is written so a fast
    /// reply cannot be missed.
    pub async fn register(&self, topic: &str) -> AckHandle {
        let (tx, rx) = oneshot::channel();
        self.table
            .lock()
            .await
            .waiters
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        AckHandle {
            topic: topic.to_string(),
            rx,
        }
    }

    /// Register a waiter for a subscribe topic.
    ///
    /// The flag is true only when no subscribe for `topic` is active or in
    /// flight, i.e. when the caller must write the command. An active topic
    /// yields a handle that is already fulfilled.
    pub async fn request_topic(&self, topic: &str) -> (AckHandle, bool) {
        let (tx, rx) = oneshot::channel();
        let handle = AckHandle {
            topic: topic.to_string(),
            rx,
        };

        let mut table = self.table.lock().await;
        if table.active.contains(topic) {
            let _ = tx.send(Ok(()));
            return (handle, false);
        }

        let waiters = table.waiters.entry(topic.to_string()).or_default();
        let in_flight = !waiters.is_empty();
        waiters.push(tx);
        (handle, !in_flight)
    }

    /// Mark a topic as subscribed on the current connection
    pub async fn activate(&self, topic: &str) {
        self.table.lock().await.active.insert(topic.to_string());
    }

    pub async fn is_active(&self, topic: &str) -> bool {
        self.table.lock().await.active.contains(topic)
    }

    /// Fulfil every waiter under `topic`. Returns how many were signalled.
    pub async fn resolve(&self, topic: &str) -> usize {
        self.complete(topic, Ok(())).await
    }

    /// Fail every waiter under `topic` with the given reason
    pub async fn reject(&self, topic: &str, reason: &str) -> usize {
        self.complete(topic, Err(reason.to_string())).await
    }

    /// Drop every waiter and forget the active topics; outstanding handles
    /// resolve to `AckDropped`
    pub async fn clear(&self) {
        let mut table = self.table.lock().await;
        table.waiters.clear();
        table.active.clear();
    }

    pub async fn pending(&self, topic: &str) -> usize {
        self.table
            .lock()
            .await
            .waiters
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn complete(&self, topic: &str, outcome: AckOutcome) -> usize {
        let waiters = self
            .table
            .lock()
            .await
            .waiters
            .remove(topic)
            .unwrap_or_default();

        let mut signalled = 0;
        for tx in waiters {
            // The caller may have stopped waiting
            if tx.send(outcome.clone()).is_ok() {
                signalled += 1;
            }
        }

        if signalled > 0 {
            debug!(topic = %topic, signalled, ok = outcome.is_ok(), "Acknowledgment delivered");
        }
        signalled
    }
}
