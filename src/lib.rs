//! BitMEX realtime client library
//!
//! This crate multiplexes one authenticated WebSocket connection to the
//! BitMEX realtime API into per-kind, per-instrument event streams, and
//! provides a signed REST client for order management.

pub mod ack;
pub mod auth;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod rest;
pub mod router;
pub mod subscription;
pub mod websocket;

pub use ack::AckHandle;
pub use auth::{Credentials, NonceSequencer};
pub use client::RealtimeClient;
pub use command::Command;
pub use config::Config;
pub use error::{BitmexError, Result};
pub use metrics::StreamMetrics;
pub use parser::{EventKind, Frame, OrderUpdate, Position, Quote, Record, Side, Trade};
pub use rest::{Order, OrderClient};
pub use subscription::{DeliveryError, EventSink, SinkId, Subscription, SubscriptionRegistry};
pub use websocket::ConnectionState;
