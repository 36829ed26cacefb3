//! Per-kind subscriber registry and fan-out
//!
//! Overflow policy is drop-and-deregister: when a sink's buffer is full the
//! event is dropped for that sink and the sink is removed from the registry
//! for that kind. A consumer that falls behind once is treated as dead and
//! must subscribe again. Sinks whose receiver has gone away are removed the
//! same way.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::sink::{DeliveryError, EventSink};
use crate::parser::{OrderUpdate, Position, Quote, Record, Trade};

/// Token identifying one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl SinkId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

/// Outcome of fanning out one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sinks the record was handed to
    pub delivered: usize,
    /// Sinks that matched but were full
    pub dropped: usize,
    /// Sinks removed after this record (full or closed)
    pub evicted: usize,
}

struct Registration<R> {
    sink: Arc<dyn EventSink<R>>,
    /// Empty means every instrument
    filter: HashSet<String>,
}

impl<R> Registration<R> {
    fn matches(&self, symbol: &str) -> bool {
        self.filter.is_empty() || self.filter.contains(symbol)
    }
}

/// Subscribers of a single event kind
pub struct KindRegistry<R> {
    entries: RwLock<HashMap<SinkId, Registration<R>>>,
}

impl<R: Record> KindRegistry<R> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn insert(&self, id: SinkId, sink: Arc<dyn EventSink<R>>, filter: HashSet<String>) {
        let mut entries = self.entries.write().await;
        entries.insert(id, Registration { sink, filter });
    }

    /// Append symbols to an existing registration's filter.
    ///
    /// Returns false if the sink is not registered.
    pub async fn extend<I>(&self, id: SinkId, symbols: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(registration) => {
                registration.filter.extend(symbols);
                true
            }
            None => false,
        }
    }

    /// Remove a registration. No command is sent to the venue.
    pub async fn remove(&self, id: SinkId) -> bool {
        self.entries.write().await.remove(&id).is_some()
    }

    /// Remove every registration
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub async fn contains(&self, id: SinkId) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    /// Current filter of a registration
    pub async fn filter(&self, id: SinkId) -> Option<HashSet<String>> {
        self.entries
            .read()
            .await
            .get(&id)
            .map(|registration| registration.filter.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Deliver a record to every matching sink without blocking.
    ///
    /// The registry lock is released before any delivery is attempted.
    pub async fn dispatch(&self, record: &R) -> DispatchReport {
        let kind = R::KIND;
        let symbol = record.symbol();

        let targets: Vec<(SinkId, Arc<dyn EventSink<R>>)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, registration)| registration.matches(symbol))
                .map(|(id, registration)| (*id, registration.sink.clone()))
                .collect()
        };

        let mut report = DispatchReport::default();
        let mut evict = Vec::new();

        for (id, sink) in targets {
            match sink.try_deliver(record.clone()) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Full) => {
                    warn!(
                        kind = %kind,
                        sink = %id,
                        symbol = %symbol,
                        "Sink buffer full, dropping event and removing sink"
                    );
                    report.dropped += 1;
                    evict.push(id);
                }
                Err(DeliveryError::Closed) => {
                    debug!(kind = %kind, sink = %id, "Sink closed, removing");
                    evict.push(id);
                }
            }
        }

        if !evict.is_empty() {
            let mut entries = self.entries.write().await;
            for id in &evict {
                if entries.remove(id).is_some() {
                    report.evicted += 1;
                }
            }
        }

        report
    }
}

/// Subscribers of every routed kind
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    pub(crate) trades: KindRegistry<Trade>,
    pub(crate) quotes: KindRegistry<Quote>,
    pub(crate) orders: KindRegistry<OrderUpdate>,
    pub(crate) positions: KindRegistry<Position>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            trades: KindRegistry::new(),
            quotes: KindRegistry::new(),
            orders: KindRegistry::new(),
            positions: KindRegistry::new(),
        }
    }

    /// Registry of one kind
    pub fn kind<R: Record>(&self) -> &KindRegistry<R> {
        R::registrations(self)
    }

    /// Register a sink under `R`'s kind with an instrument filter
    /// (empty = all instruments).
    pub async fn register<R, I>(&self, sink: Arc<dyn EventSink<R>>, filter: I) -> SinkId
    where
        R: Record,
        I: IntoIterator<Item = String>,
    {
        let id = SinkId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let kind = R::KIND;
        let filter: HashSet<String> = filter.into_iter().collect();

        debug!(kind = %kind, sink = %id, filter = ?filter, "Registering sink");
        self.kind::<R>().insert(id, sink, filter).await;

        id
    }

    pub async fn dispatch<R: Record>(&self, record: &R) -> DispatchReport {
        self.kind::<R>().dispatch(record).await
    }

    /// Drop every registration of every kind
    pub async fn clear(&self) -> usize {
        self.trades.clear().await
            + self.quotes.clear().await
            + self.orders.clear().await
            + self.positions.clear().await
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockall::mock;
    use rust_decimal_macros::dec;
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    mock! {
        TradeSink {}

        impl EventSink<Trade> for TradeSink {
            fn try_deliver(&self, event: Trade) -> Result<(), DeliveryError>;
        }
    }

    fn trade(symbol: &str) -> Trade {
        Trade {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            side: None,
            size: dec!(10),
            price: dec!(6500),
            tick_direction: None,
            trade_match_id: None,
            gross_value: None,
            home_notional: None,
            foreign_notional: None,
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_filtered_and_unfiltered_fan_out() {
        let registry = SubscriptionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel::<Trade>(8);
        let (tx_b, mut rx_b) = mpsc::channel::<Trade>(8);

        registry.register::<Trade, _>(Arc::new(tx_a), symbols(&[])).await;
        registry
            .register::<Trade, _>(Arc::new(tx_b), symbols(&["XBTUSD"]))
            .await;

        let report = registry.dispatch(&trade("XBTUSD")).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap().symbol, "XBTUSD");
        assert_eq!(rx_b.try_recv().unwrap().symbol, "XBTUSD");

        let report = registry.dispatch(&trade("ETHUSD")).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(rx_a.try_recv().unwrap().symbol, "ETHUSD");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel::<Trade>(8);
        registry.register::<Trade, _>(Arc::new(tx), symbols(&[])).await;

        assert_eq!(registry.kind::<Trade>().len().await, 1);
        assert!(registry.kind::<Quote>().is_empty().await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_extend_appends_to_filter() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel::<Trade>(8);
        let id = registry
            .register::<Trade, _>(Arc::new(tx), symbols(&["XBTUSD"]))
            .await;

        assert!(registry.kind::<Trade>().extend(id, symbols(&["ETHUSD"])).await);

        let filter = registry.kind::<Trade>().filter(id).await.unwrap();
        assert!(filter.contains("XBTUSD"));
        assert!(filter.contains("ETHUSD"));

        registry.dispatch(&trade("ETHUSD")).await;
        assert_eq!(rx.try_recv().unwrap().symbol, "ETHUSD");

        let unknown = SinkId(999);
        assert!(!registry.kind::<Trade>().extend(unknown, symbols(&["X"])).await);
    }

    #[tokio::test]
    async fn test_full_sink_is_dropped_and_deregistered() {
        let registry = SubscriptionRegistry::new();
        let (slow_tx, mut slow_rx) = mpsc::channel::<Trade>(1);
        let (fast_tx, mut fast_rx) = mpsc::channel::<Trade>(8);

        let slow = registry.register::<Trade, _>(Arc::new(slow_tx), symbols(&[])).await;
        let fast = registry.register::<Trade, _>(Arc::new(fast_tx), symbols(&[])).await;

        registry.dispatch(&trade("XBTUSD")).await;

        let report = registry.dispatch(&trade("XBTUSD")).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.evicted, 1);

        assert!(!registry.kind::<Trade>().contains(slow).await);
        assert!(registry.kind::<Trade>().contains(fast).await);

        // Draining does not bring the evicted sink back
        assert!(slow_rx.try_recv().is_ok());
        registry.dispatch(&trade("XBTUSD")).await;
        assert!(slow_rx.try_recv().is_err());

        let mut fast_received = 0;
        while fast_rx.try_recv().is_ok() {
            fast_received += 1;
        }
        assert_eq!(fast_received, 3);
    }

    #[tokio::test]
    async fn test_closed_sink_is_removed() {
        let registry = SubscriptionRegistry::new();
        let (tx, rx) = mpsc::channel::<Trade>(4);
        let id = registry.register::<Trade, _>(Arc::new(tx), symbols(&[])).await;
        drop(rx);

        let report = registry.dispatch(&trade("XBTUSD")).await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.evicted, 1);
        assert!(!registry.kind::<Trade>().contains(id).await);
    }

    #[tokio::test]
    async fn test_mock_sink_sees_only_matching_records() {
        let registry = SubscriptionRegistry::new();
        let mut sink = MockTradeSink::new();
        sink.expect_try_deliver()
            .withf(|event| event.symbol == "XBTUSD")
            .times(2)
            .returning(|_| Ok(()));

        registry
            .register::<Trade, _>(Arc::new(sink), symbols(&["XBTUSD"]))
            .await;

        registry.dispatch(&trade("XBTUSD")).await;
        registry.dispatch(&trade("ETHUSD")).await;
        registry.dispatch(&trade("XBTUSD")).await;
    }

    #[tokio::test]
    async fn test_full_sink_does_not_stall_dispatch() {
        let registry = SubscriptionRegistry::new();
        let (stuck_tx, _stuck_rx) = mpsc::channel::<Trade>(1);
        stuck_tx.try_send(trade("XBTUSD")).unwrap();
        let (tx, mut rx) = mpsc::channel::<Trade>(2048);

        registry.register::<Trade, _>(Arc::new(stuck_tx), symbols(&[])).await;
        registry.register::<Trade, _>(Arc::new(tx), symbols(&[])).await;

        let started = Instant::now();
        for _ in 0..1000 {
            registry.dispatch(&trade("XBTUSD")).await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 1000);
    }
}
