//! Stream counters
//!
//! Each client owns its own `prometheus::Registry`, so several clients in one
//! process do not collide on metric names.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::Result;
use crate::parser::EventKind;
use crate::subscription::DispatchReport;

/// Counters updated by the receive loop
pub struct StreamMetrics {
    registry: Registry,
    frames_received: IntCounter,
    fatal_errors: IntCounter,
    skipped_batches: IntCounterVec,
    events_delivered: IntCounterVec,
    events_dropped: IntCounterVec,
    sinks_evicted: IntCounterVec,
}

impl StreamMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let frames_received = IntCounter::new(
            "bitmex_frames_received_total",
            "Text frames read from the realtime socket",
        )?;
        let fatal_errors = IntCounter::new(
            "bitmex_fatal_errors_total",
            "Connections torn down by a fatal condition",
        )?;
        let skipped_batches = IntCounterVec::new(
            Opts::new(
                "bitmex_skipped_batches_total",
                "Table batches that failed to decode",
            ),
            &["table"],
        )?;
        let events_delivered = IntCounterVec::new(
            Opts::new("bitmex_events_delivered_total", "Events handed to sinks"),
            &["kind"],
        )?;
        let events_dropped = IntCounterVec::new(
            Opts::new(
                "bitmex_events_dropped_total",
                "Events dropped because a sink was full",
            ),
            &["kind"],
        )?;
        let sinks_evicted = IntCounterVec::new(
            Opts::new(
                "bitmex_sinks_evicted_total",
                "Sinks removed after overflowing or closing",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(fatal_errors.clone()))?;
        registry.register(Box::new(skipped_batches.clone()))?;
        registry.register(Box::new(events_delivered.clone()))?;
        registry.register(Box::new(events_dropped.clone()))?;
        registry.register(Box::new(sinks_evicted.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            fatal_errors,
            skipped_batches,
            events_delivered,
            events_dropped,
            sinks_evicted,
        })
    }

    pub fn frame_received(&self) {
        self.frames_received.inc();
    }

    pub fn fatal_error(&self) {
        self.fatal_errors.inc();
    }

    pub fn batch_skipped(&self, table: &str) {
        self.skipped_batches.with_label_values(&[table]).inc();
    }

    pub fn record_dispatch(&self, kind: EventKind, report: &DispatchReport) {
        let label = [kind.table()];
        self.events_delivered
            .with_label_values(&label)
            .inc_by(report.delivered as u64);
        self.events_dropped
            .with_label_values(&label)
            .inc_by(report.dropped as u64);
        self.sinks_evicted
            .with_label_values(&label)
            .inc_by(report.evicted as u64);
    }

    pub fn frames(&self) -> u64 {
        self.frames_received.get()
    }

    pub fn fatal_errors(&self) -> u64 {
        self.fatal_errors.get()
    }

    pub fn delivered(&self, kind: EventKind) -> u64 {
        self.events_delivered.with_label_values(&[kind.table()]).get()
    }

    pub fn dropped(&self, kind: EventKind) -> u64 {
        self.events_dropped.with_label_values(&[kind.table()]).get()
    }

    pub fn evicted(&self, kind: EventKind) -> u64 {
        self.sinks_evicted.with_label_values(&[kind.table()]).get()
    }

    pub fn skipped(&self, table: &str) -> u64 {
        self.skipped_batches.with_label_values(&[table]).get()
    }

    /// Prometheus text exposition of every counter
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::BitmexError::MetricsError(e.to_string()))
    }
}
