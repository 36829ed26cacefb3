//! Message router
//!
//! Turns each received text frame into acknowledgments, log lines, or typed
//! records handed to the dispatcher.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::ack::PendingAcks;
use crate::error::Result;
use crate::metrics::StreamMetrics;
use crate::parser::{
    ErrorFrame, EventKind, Frame, InfoFrame, OrderUpdate, Position, Quote, Record, SuccessFrame,
    TableFrame, Trade,
};
use crate::subscription::SubscriptionRegistry;

/// Routes frames from the receive loop
pub struct MessageRouter {
    registry: Arc<SubscriptionRegistry>,
    acks: Arc<PendingAcks>,
    metrics: Arc<StreamMetrics>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        acks: Arc<PendingAcks>,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            registry,
            acks,
            metrics,
        }
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    /// Drop every pending acknowledgment after the connection died; no reply
    /// can arrive any more.
    pub async fn abandon_pending(&self) {
        self.acks.clear().await;
    }

    /// Route one frame.
    ///
    /// Only framing violations are returned as errors; those are fatal for
    /// the connection. Batch decode failures are logged and skipped.
    pub async fn route(&self, raw: &str) -> Result<()> {
        self.metrics.frame_received();
        debug!(len = raw.len(), "Routing frame");

        match Frame::parse(raw)? {
            Frame::Success(success) => self.on_success(success).await,
            Frame::Info(info) => self.on_info(&info),
            Frame::Error(error) => self.on_error(error).await,
            Frame::Table(table) => self.on_table(&table).await,
        }

        Ok(())
    }

    async fn on_success(&self, frame: SuccessFrame) {
        let mut keys = frame
            .request
            .as_ref()
            .map(|request| request.ack_keys())
            .unwrap_or_default();
        if let Some(topic) = &frame.subscribe {
            if !keys.contains(topic) {
                keys.push(topic.clone());
            }
        }

        debug!(success = frame.success, keys = ?keys, "Acknowledgment received");

        if frame.success {
            if let Some(topic) = &frame.subscribe {
                self.acks.activate(topic).await;
            }
        }

        for key in &keys {
            if frame.success {
                self.acks.resolve(key).await;
            } else {
                self.acks.reject(key, "request was not successful").await;
            }
        }
    }

    fn on_info(&self, frame: &InfoFrame) {
        info!(
            info = %frame.info,
            version = ?frame.version,
            heartbeat = ?frame.heartbeat_enabled,
            "Venue info"
        );
    }

    async fn on_error(&self, frame: ErrorFrame) {
        error!(status = ?frame.status, error = %frame.error, "Venue reported an error");

        if let Some(request) = frame.request {
            for key in request.ack_keys() {
                self.acks.reject(&key, &frame.error).await;
            }
        }
    }

    async fn on_table(&self, table: &TableFrame) {
        match table.kind() {
            Some(EventKind::Trade) => self.dispatch_batch::<Trade>(table).await,
            Some(EventKind::Quote) => self.dispatch_batch::<Quote>(table).await,
            Some(EventKind::Order) => self.dispatch_batch::<OrderUpdate>(table).await,
            Some(EventKind::Position) => self.dispatch_batch::<Position>(table).await,
            None => debug!(table = %table.table, "Ignoring unrouted table"),
        }
    }

    async fn dispatch_batch<R: Record>(&self, table: &TableFrame) {
        let records: Vec<R> = match table.decode() {
            Ok(records) => records,
            Err(e) => {
                warn!(table = %table.table, action = %table.action, error = %e, "Skipping undecodable batch");
                self.metrics.batch_skipped(&table.table);
                return;
            }
        };

        debug!(
            table = %table.table,
            action = %table.action,
            count = records.len(),
            "Dispatching batch"
        );

        for record in &records {
            let report = self.registry.dispatch(record).await;
            self.metrics.record_dispatch(R::KIND, &report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BitmexError;
    use crate::subscription::EventSink;
    use tokio::sync::mpsc;

    fn router() -> (MessageRouter, Arc<SubscriptionRegistry>, Arc<PendingAcks>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let acks = Arc::new(PendingAcks::new());
        let metrics = Arc::new(StreamMetrics::new().unwrap());
        (
            MessageRouter::new(registry.clone(), acks.clone(), metrics),
            registry,
            acks,
        )
    }

    fn trade_frame(symbols: &[&str]) -> String {
        let rows: Vec<String> = symbols
            .iter()
            .map(|symbol| {
                format!(
                    r#"{{"timestamp":"2018-10-26T07:28:00.542Z","symbol":"{}","side":"Sell","size":5,"price":6500}}"#,
                    symbol
                )
            })
            .collect();
        format!(
            r#"{{"table":"trade","action":"insert","data":[{}]}}"#,
            rows.join(",")
        )
    }

    #[tokio::test]
    async fn test_routes_batch_in_order() {
        let (router, registry, _) = router();
        let (tx, mut rx) = mpsc::channel::<Trade>(8);
        let sink: Arc<dyn EventSink<Trade>> = Arc::new(tx);
        registry.register(sink, Vec::<String>::new()).await;

        router
            .route(&trade_frame(&["XBTUSD", "ETHUSD", "XBTUSD"]))
            .await
            .unwrap();

        let received: Vec<String> = (0..3).map(|_| rx.try_recv().unwrap().symbol).collect();
        assert_eq!(received, vec!["XBTUSD", "ETHUSD", "XBTUSD"]);
        assert_eq!(router.metrics().delivered(EventKind::Trade), 3);
    }

    #[tokio::test]
    async fn test_success_resolves_op_and_args() {
        let (router, _, acks) = router();
        let auth = acks.register("authKey").await;
        let order = acks.register("order").await;

        router
            .route(r#"{"success":true,"request":{"op":"authKey","args":["key",1,"sig"]}}"#)
            .await
            .unwrap();
        router
            .route(r#"{"success":true,"subscribe":"order","request":{"op":"subscribe","args":"order"}}"#)
            .await
            .unwrap();

        auth.acknowledged().await.unwrap();
        order.acknowledged().await.unwrap();
    }

    #[tokio::test]
    async fn test_success_activates_topic() {
        let (router, _, acks) = router();
        router
            .route(r#"{"success":true,"subscribe":"position","request":{"op":"subscribe","args":"position"}}"#)
            .await
            .unwrap();
        assert!(acks.is_active("position").await);

        router
            .route(r#"{"success":false,"subscribe":"order","request":{"op":"subscribe","args":"order"}}"#)
            .await
            .unwrap();
        assert!(!acks.is_active("order").await);
    }

    #[tokio::test]
    async fn test_abandon_pending_drops_waiters() {
        let (router, _, acks) = router();
        let ack = acks.register("order").await;

        router.abandon_pending().await;
        assert!(matches!(
            ack.acknowledged().await,
            Err(BitmexError::AckDropped(_))
        ));
    }

    #[tokio::test]
    async fn test_routes_private_tables_to_filtered_sinks() {
        let (router, registry, _) = router();
        let (order_tx, mut order_rx) = mpsc::channel::<OrderUpdate>(8);
        let (position_tx, mut position_rx) = mpsc::channel::<Position>(8);
        let order_sink: Arc<dyn EventSink<OrderUpdate>> = Arc::new(order_tx);
        let position_sink: Arc<dyn EventSink<Position>> = Arc::new(position_tx);
        registry.register(order_sink, vec!["XBTUSD".to_string()]).await;
        registry.register(position_sink, vec!["ETHUSD".to_string()]).await;

        router
            .route(
                r#"{"table":"order","action":"insert","keys":["orderID"],"data":[
                    {"orderID":"a1","symbol":"XBTUSD","ordStatus":"New","orderQty":100,"price":6500},
                    {"orderID":"a2","symbol":"ETHUSD","ordStatus":"New","orderQty":5,"price":210.5}
                ]}"#,
            )
            .await
            .unwrap();
        router
            .route(
                r#"{"table":"position","action":"update","data":[
                    {"account":12345,"symbol":"XBTUSD","currentQty":100},
                    {"account":12345,"symbol":"ETHUSD","currentQty":-5}
                ]}"#,
            )
            .await
            .unwrap();

        let order = order_rx.try_recv().unwrap();
        assert_eq!(order.order_id, "a1");
        assert!(order_rx.try_recv().is_err());

        let position = position_rx.try_recv().unwrap();
        assert_eq!(position.symbol, "ETHUSD");
        assert_eq!(position.current_qty, Some(-5));
        assert!(position_rx.try_recv().is_err());

        assert_eq!(router.metrics().delivered(EventKind::Order), 1);
        assert_eq!(router.metrics().delivered(EventKind::Position), 1);
    }

    #[tokio::test]
    async fn test_error_rejects_echoed_topic() {
        let (router, _, acks) = router();
        let ack = acks.register("trade:NOPE").await;

        router
            .route(r#"{"status":400,"error":"Unknown symbol","request":{"op":"subscribe","args":"trade:NOPE"}}"#)
            .await
            .unwrap();

        assert!(matches!(
            ack.acknowledged().await,
            Err(BitmexError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_table_is_ignored() {
        let (router, _, _) = router();
        let result = router
            .route(r#"{"table":"orderBookL2_25","action":"partial","data":[{"symbol":"XBTUSD"}]}"#)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bad_batch_is_skipped() {
        let (router, registry, _) = router();
        let (tx, mut rx) = mpsc::channel::<Quote>(8);
        let sink: Arc<dyn EventSink<Quote>> = Arc::new(tx);
        registry.register(sink, Vec::<String>::new()).await;

        let result = router
            .route(r#"{"table":"quote","action":"insert","data":[{"symbol":"XBTUSD"}]}"#)
            .await;
        assert!(result.is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(router.metrics().skipped("quote"), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_frame_is_fatal() {
        let (router, _, _) = router();
        let err = router.route(r#"{"unexpected":true}"#).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
