//! WebSocket module for the realtime connection

mod client;
mod manager;

pub use client::{FrameReader, FrameWriter, WebSocketClient};
pub use manager::{ConnectionManager, ConnectionState};
