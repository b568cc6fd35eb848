//! Wire protocol shared by the server and its clients.
//!
//! Every frame is a JSON text message. Server pushes travel as
//! [`ServerPush`]; client events as [`ClientEvent`]. Payloads stay opaque
//! (`serde_json::Value`) to the delivery core; only the built-in kinds
//! (acks, pings, receipts, presence) are interpreted here.

pub mod kinds;
pub mod models;

pub use kinds::{ClientKind, PushKind};
pub use models::{
    ClientReply, MessageReceipt, PresenceRecord, ReadReceipt, ReadReceipts, ReceiptKind,
    ReplyError,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FrameError;
use crate::ids::{EventId, RecipientId};

/// A server-originated event addressed to one recipient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerPush {
    /// Event id. Unique per recipient; time-sortable when server generated.
    pub id: EventId,
    /// Recipient the event is addressed to.
    #[serde(rename = "userId")]
    pub recipient: RecipientId,
    /// How the payload is interpreted by the domain layer.
    #[serde(rename = "type")]
    pub kind: PushKind,
    /// Opaque payload.
    #[serde(rename = "data", default)]
    pub payload: Value,
}

impl ServerPush {
    /// Create a push with a freshly generated id.
    pub fn new(recipient: RecipientId, kind: PushKind, payload: Value) -> Self {
        Self {
            id: EventId::new(),
            recipient,
            kind,
            payload,
        }
    }

    /// Same event readdressed to another recipient (group fan-out keeps the id).
    #[must_use]
    pub fn for_recipient(&self, recipient: RecipientId) -> Self {
        Self {
            recipient,
            ..self.clone()
        }
    }

    /// Serialize to the JSON text sent over the transport.
    pub fn to_frame(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::Encode)
    }

    /// The `sentBy` field of the payload, if any.
    pub fn author(&self) -> Option<RecipientId> {
        self.payload
            .get("sentBy")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(RecipientId::from)
    }
}

/// A client-originated event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Client-chosen correlation id echoed back in replies.
    #[serde(rename = "id")]
    pub sequence: u32,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: ClientKind,
    /// Opaque payload.
    #[serde(rename = "data", default)]
    pub payload: Value,
}

impl ClientEvent {
    /// Decode one inbound text frame.
    ///
    /// Frames over `max_bytes` are rejected before parsing.
    pub fn decode(frame: &str, max_bytes: usize) -> Result<Self, FrameError> {
        if frame.len() > max_bytes {
            return Err(FrameError::TooLarge {
                size: frame.len(),
                limit: max_bytes,
            });
        }
        serde_json::from_str(frame).map_err(FrameError::Decode)
    }

    /// Decode one inbound binary frame carrying UTF-8 JSON.
    pub fn decode_bytes(frame: &[u8], max_bytes: usize) -> Result<Self, FrameError> {
        if frame.len() > max_bytes {
            return Err(FrameError::TooLarge {
                size: frame.len(),
                limit: max_bytes,
            });
        }
        let text = std::str::from_utf8(frame).map_err(|_| FrameError::NotUtf8)?;
        Self::decode(text, max_bytes)
    }

    /// Interpret the payload as a typed value.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, FrameError> {
        serde_json::from_value(self.payload.clone()).map_err(FrameError::Decode)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
