//! CDP wire envelopes
//!
//! Outbound commands are `{"id", "method", "params"}`. Inbound frames are either a
//! reply (`id` plus `result` or `error`) or an event (`method` plus `params`, no `id`).

use crate::error::RemoteError;
use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

/// Result payload used when a reply carries neither `result` nor `error`
const EMPTY_RESULT: &[u8] = b"{}";

/// CDP JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest<'a> {
    /// Request ID
    pub id: u64,
    /// Method name (e.g., "DOM.getDocument")
    pub method: &'a str,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> CdpRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            id,
            method,
            params: if params.is_null() { None } else { Some(params) },
        }
    }

    /// Serialize to a text frame
    pub fn to_frame(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::encode(format!("Failed to serialize request: {}", e)))
    }
}

/// Any inbound frame, before classification
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Box<RawValue>>,
    #[serde(default)]
    pub error: Option<RemoteError>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Just the `id` of a frame whose other fields did not decode
#[derive(Debug, Deserialize)]
struct FrameId {
    #[serde(default)]
    id: Option<u64>,
}

/// Command id carried by `text`, if any, regardless of the shape of the rest
pub fn reply_id(text: &str) -> Option<u64> {
    serde_json::from_str::<FrameId>(text).ok()?.id
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::decode(format!("Malformed frame: {}", e)))
    }

    pub fn parse_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| Error::decode(format!("Malformed frame: {}", e)))
    }
}

/// CDP event representation
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
    /// Event method (e.g., "DOM.attributeModified")
    pub method: String,
    /// Event parameters
    pub params: Value,
    /// Session ID (for flattened multi-session targets)
    pub session_id: Option<String>,
}

impl CdpEvent {
    pub fn new<S: Into<String>>(method: S, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            session_id: None,
        }
    }

    /// Domain part of the event name ("DOM" for "DOM.attributeModified")
    pub fn domain(&self) -> &str {
        self.method.split_once('.').map_or("", |(domain, _)| domain)
    }
}

/// Classified inbound message
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// Reply to outstanding command `id`
    Reply {
        id: u64,
        outcome: std::result::Result<Bytes, RemoteError>,
    },
    /// Unsolicited notification
    Event(CdpEvent),
}

impl InboundMessage {
    /// Decide reply vs. event by the presence of `id`
    pub fn classify(frame: InboundFrame) -> Result<Self> {
        if let Some(id) = frame.id {
            let outcome = match (frame.error, frame.result) {
                (Some(error), _) => Err(error),
                (None, Some(raw)) => Ok(Bytes::copy_from_slice(raw.get().as_bytes())),
                (None, None) => Ok(Bytes::from_static(EMPTY_RESULT)),
            };
            return Ok(InboundMessage::Reply { id, outcome });
        }

        match frame.method {
            Some(method) => Ok(InboundMessage::Event(CdpEvent {
                method,
                params: frame.params.unwrap_or(Value::Null),
                session_id: frame.session_id,
            })),
            None => Err(Error::decode("Frame has neither id nor method")),
        }
    }

    pub fn from_text(text: &str) -> Result<Self> {
        Self::classify(InboundFrame::parse(text)?)
    }
}
