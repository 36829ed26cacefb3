//! Configuration module for the realtime client

use serde::Deserialize;
use std::env;

use crate::auth::Credentials;

pub const DEFAULT_WS_ENDPOINT: &str = "wss://www.bitmex.com/realtime";
pub const DEFAULT_REST_ENDPOINT: &str = "https://www.bitmex.com";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API key (`BITMEX_KEY`)
    pub api_key: Option<String>,

    /// API secret (`BITMEX_SECRET`)
    pub api_secret: Option<String>,

    /// Realtime WebSocket endpoint
    pub ws_endpoint: String,

    /// REST endpoint (without the API version prefix)
    pub rest_endpoint: String,

    /// Instruments the demo binary subscribes to (e.g., ["XBTUSD", "ETHUSD"])
    pub symbols: Vec<String>,

    /// Buffer size of each consumer channel created by the binary
    pub sink_capacity: usize,

    /// Idle time after which the receive loop sends a keepalive ping
    pub keepalive_interval_secs: u64,

    /// Port of the health and metrics server
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let symbols: Vec<String> = lookup("SYMBOLS")
            .unwrap_or_else(|| "XBTUSD".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            api_key: lookup("BITMEX_KEY").filter(|v| !v.is_empty()),
            api_secret: lookup("BITMEX_SECRET").filter(|v| !v.is_empty()),
            ws_endpoint: lookup("BITMEX_WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            rest_endpoint: lookup("BITMEX_REST_ENDPOINT").unwrap_or(defaults.rest_endpoint),
            symbols,
            sink_capacity: lookup("SINK_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|capacity: &usize| *capacity > 0)
                .unwrap_or(defaults.sink_capacity),
            keepalive_interval_secs: lookup("KEEPALIVE_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.keepalive_interval_secs),
            metrics_port: lookup("METRICS_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }

    /// API credentials, when both key and secret are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some(Credentials::new(key, secret)),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            rest_endpoint: DEFAULT_REST_ENDPOINT.to_string(),
            symbols: vec!["XBTUSD".to_string()],
            sink_capacity: 1024,
            keepalive_interval_secs: 30,
            metrics_port: 9090,
        }
    }
}
