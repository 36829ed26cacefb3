//! Parser module for BitMEX realtime frames
//!
//! The venue's frames are not self-describing, so each one is classified by
//! checking for its marker field in a fixed order: `success`, `info`, `error`,
//! `table`. Data tables are then decoded into typed record batches.

mod records;

pub use records::{EventKind, OrderUpdate, Position, Quote, Record, Side, Trade};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::command::SUBSCRIBE_OP;
use crate::error::{BitmexError, Result};

/// Longest raw excerpt carried in an `UnrecognizedFrame` error
const EXCERPT_LEN: usize = 256;

/// Shape of a frame, decided by its marker field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Success,
    Info,
    Error,
    Table,
}

/// Marker fields, evaluated in order
const FRAME_MARKERS: [(&str, FrameKind); 4] = [
    ("success", FrameKind::Success),
    ("info", FrameKind::Info),
    ("error", FrameKind::Error),
    ("table", FrameKind::Table),
];

impl FrameKind {
    fn classify(object: &Map<String, Value>) -> Option<Self> {
        FRAME_MARKERS
            .iter()
            .find(|(marker, _)| object.contains_key(*marker))
            .map(|(_, kind)| *kind)
    }
}

/// Request echoed back in success and error frames
#[derive(Debug, Clone, Deserialize)]
pub struct EchoedRequest {
    pub op: String,

    #[serde(default)]
    pub args: Value,
}

impl EchoedRequest {
    /// Keys a pending acknowledgment may be registered under: the op itself
    /// and, for subscribe requests, every topic argument. Other ops carry
    /// credentials in their arguments and are keyed on the op alone.
    pub fn ack_keys(&self) -> Vec<String> {
        let mut keys = vec![self.op.clone()];
        if self.op != SUBSCRIBE_OP {
            return keys;
        }
        match &self.args {
            Value::String(arg) => keys.push(arg.clone()),
            Value::Array(args) => keys.extend(
                args.iter()
                    .filter_map(|arg| arg.as_str().map(str::to_string)),
            ),
            _ => {}
        }
        keys
    }
}

/// `{"success":true,"subscribe":"trade:XBTUSD","request":{...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct SuccessFrame {
    pub success: bool,
    pub subscribe: Option<String>,
    pub request: Option<EchoedRequest>,
}

/// Welcome banner sent right after connecting
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoFrame {
    pub info: String,
    pub version: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub docs: Option<String>,
    pub heartbeat_enabled: Option<bool>,
}

/// `{"status":400,"error":"...","request":{...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
    pub status: Option<u16>,
    pub request: Option<EchoedRequest>,
}

/// `{"table":"trade","action":"insert","keys":[...],"data":[...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct TableFrame {
    pub table: String,

    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub keys: Vec<String>,

    #[serde(default)]
    pub data: Value,
}

impl TableFrame {
    /// Decode the raw rows into a typed batch
    pub fn decode<R: DeserializeOwned>(&self) -> std::result::Result<Vec<R>, serde_json::Error> {
        Vec::<R>::deserialize(&self.data)
    }

    /// Event kind carried by this table, if it is one the client routes
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_table(&self.table)
    }
}

/// A classified realtime frame
#[derive(Debug, Clone)]
pub enum Frame {
    Success(SuccessFrame),
    Info(InfoFrame),
    Error(ErrorFrame),
    Table(TableFrame),
}

impl Frame {
    /// Classify and decode one text frame.
    ///
    /// Anything that is not a JSON object carrying one of the marker fields
    /// is an `UnrecognizedFrame`.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|_| unrecognized(raw))?;

        let kind = match &value {
            Value::Object(object) => FrameKind::classify(object),
            _ => None,
        }
        .ok_or_else(|| unrecognized(raw))?;

        let frame = match kind {
            FrameKind::Success => serde_json::from_value(value).map(Frame::Success),
            FrameKind::Info => serde_json::from_value(value).map(Frame::Info),
            FrameKind::Error => serde_json::from_value(value).map(Frame::Error),
            FrameKind::Table => serde_json::from_value(value).map(Frame::Table),
        };

        frame.map_err(|_| unrecognized(raw))
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Success(_) => FrameKind::Success,
            Frame::Info(_) => FrameKind::Info,
            Frame::Error(_) => FrameKind::Error,
            Frame::Table(_) => FrameKind::Table,
        }
    }
}

fn unrecognized(raw: &str) -> BitmexError {
    let excerpt: String = raw.chars().take(EXCERPT_LEN).collect();
    BitmexError::UnrecognizedFrame(excerpt)
}
