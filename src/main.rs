//! BitMEX realtime demo
//!
//! Connects to the realtime API, subscribes trades and quotes for the
//! configured instruments (plus orders and positions when credentials are
//! set), logs every event, and serves health and metrics over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bitmex_realtime::{
    Config, ConnectionState, OrderUpdate, Position, Quote, RealtimeClient, Record, Trade,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting BitMEX realtime client");

    let config = Config::load()?;
    info!(symbols = ?config.symbols, endpoint = %config.ws_endpoint, "Configuration loaded");

    let client = Arc::new(RealtimeClient::new(&config)?);
    client.connect().await?;

    // Start health check server
    let health_client = client.clone();
    let port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_client, port).await {
            warn!(error = %e, "Health server error");
        }
    });

    let (trade_tx, trade_rx) = mpsc::channel::<Trade>(config.sink_capacity);
    client
        .subscribe(trade_tx, config.symbols.iter().cloned())
        .await?
        .acknowledged()
        .await?;
    tokio::spawn(consume(trade_rx, |trade: &Trade| {
        info!(
            symbol = %trade.symbol,
            side = ?trade.side,
            size = %trade.size,
            price = %trade.price,
            "Trade"
        );
    }));

    let (quote_tx, quote_rx) = mpsc::channel::<Quote>(config.sink_capacity);
    client
        .subscribe(quote_tx, config.symbols.iter().cloned())
        .await?
        .acknowledged()
        .await?;
    tokio::spawn(consume(quote_rx, |quote: &Quote| {
        info!(
            symbol = %quote.symbol,
            bid = ?quote.bid_price,
            ask = ?quote.ask_price,
            mid = ?quote.mid_price(),
            "Quote"
        );
    }));

    if let Some(credentials) = config.credentials() {
        client.authenticate_with(credentials).await?.acknowledged().await?;
        info!("Authenticated");

        let (order_tx, order_rx) = mpsc::channel::<OrderUpdate>(config.sink_capacity);
        client.subscribe_all(order_tx).await?.acknowledged().await?;
        tokio::spawn(consume(order_rx, |order: &OrderUpdate| {
            info!(
                order_id = %order.order_id,
                symbol = %order.symbol,
                status = ?order.ord_status,
                leaves = ?order.leaves_qty,
                "Order"
            );
        }));

        let (position_tx, position_rx) = mpsc::channel::<Position>(config.sink_capacity);
        client.subscribe_all(position_tx).await?.acknowledged().await?;
        tokio::spawn(consume(position_rx, |position: &Position| {
            info!(
                symbol = %position.symbol,
                qty = ?position.current_qty,
                mark = ?position.mark_price,
                "Position"
            );
        }));
    }

    let mut state = client.watch_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                client.disconnect().await?;
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                if let ConnectionState::Failed(reason) = current {
                    error!(reason = %reason, "Connection failed");
                    anyhow::bail!("realtime connection failed: {}", reason);
                }
            }
        }
    }

    Ok(())
}

/// Drain one event stream, logging each record
async fn consume<R, F>(mut rx: mpsc::Receiver<R>, log: F)
where
    R: Record,
    F: Fn(&R) + Send + 'static,
{
    let kind = R::KIND;
    while let Some(record) = rx.recv().await {
        log(&record);
    }
    info!(kind = %kind, "Event stream closed");
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(client: Arc<RealtimeClient>, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(client);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(client): State<Arc<RealtimeClient>>) -> Json<serde_json::Value> {
    let (status, connection) = match client.state() {
        ConnectionState::Connected => ("healthy", "connected".to_string()),
        ConnectionState::Disconnected => ("degraded", "disconnected".to_string()),
        ConnectionState::Failed(reason) => ("degraded", format!("failed: {}", reason)),
    };

    Json(serde_json::json!({
        "status": status,
        "component": "bitmex-realtime",
        "connection": connection,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(client): State<Arc<RealtimeClient>>) -> Result<String, (StatusCode, String)> {
    client
        .metrics()
        .render()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
