//! Payload models for the kinds the delivery core interprets itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EventId, RecipientId};

/// Last known presence of a recipient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// Id of this presence update.
    pub id: EventId,
    /// Whether the owner currently has a live connection.
    pub is_present: bool,
    /// Chat the update relates to (empty when none).
    #[serde(default)]
    pub chat_id: String,
    /// Task the update relates to (empty when none).
    #[serde(default)]
    pub task_id: String,
    /// Whether the owner is typing.
    #[serde(default)]
    pub is_typing: bool,
    /// Owner of this presence record.
    pub sent_by: RecipientId,
    /// When the update was produced.
    pub timestamp: DateTime<Utc>,
}

impl PresenceRecord {
    /// Presence for a freshly connected owner.
    pub fn online(owner: RecipientId) -> Self {
        Self::with_state(owner, true)
    }

    /// Presence for an owner that just disconnected.
    pub fn offline(owner: RecipientId) -> Self {
        Self::with_state(owner, false)
    }

    fn with_state(owner: RecipientId, is_present: bool) -> Self {
        Self {
            id: EventId::new(),
            is_present,
            chat_id: String::new(),
            task_id: String::new(),
            is_typing: false,
            sent_by: owner,
            timestamp: Utc::now(),
        }
    }
}

/// Receipt state reported back to a message author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum ReceiptKind {
    /// No receipt.
    None,
    /// Accepted by the server.
    Sent,
    /// Acknowledged by the recipient's device.
    Delivered,
    /// Read by the recipient.
    Read,
}

impl From<i16> for ReceiptKind {
    fn from(value: i16) -> Self {
        match value {
            1 => Self::Sent,
            2 => Self::Delivered,
            3 => Self::Read,
            _ => Self::None,
        }
    }
}

impl From<ReceiptKind> for i16 {
    fn from(kind: ReceiptKind) -> Self {
        match kind {
            ReceiptKind::None => 0,
            ReceiptKind::Sent => 1,
            ReceiptKind::Delivered => 2,
            ReceiptKind::Read => 3,
        }
    }
}

/// Payload of a `MessageReceipt` push.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceipt {
    /// Receipt state.
    #[serde(rename = "type")]
    pub kind: ReceiptKind,
    /// Message the receipt refers to.
    pub message_id: EventId,
    /// Recipient that produced the receipt.
    pub app_user: RecipientId,
    /// When the receipt was produced.
    pub timestamp: DateTime<Utc>,
}

impl MessageReceipt {
    /// Build a receipt stamped now.
    pub fn now(kind: ReceiptKind, message_id: EventId, app_user: RecipientId) -> Self {
        Self {
            kind,
            message_id,
            app_user,
            timestamp: Utc::now(),
        }
    }
}

/// Error body of a [`ClientReply`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplyError {
    /// Numeric error code.
    pub code: u32,
    /// Human readable message.
    pub message: String,
}

/// Payload of a `ClientReply` push, correlated by the client's sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientReply {
    /// Sequence of the client event being answered.
    pub id: u32,
    /// Set when the event could not be handled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
    /// Optional result value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ClientReply {
    /// Successful reply with no result body.
    pub fn ok(id: u32) -> Self {
        Self {
            id,
            error: None,
            result: None,
        }
    }

    /// Failed reply.
    pub fn error(id: u32, code: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            error: Some(ReplyError {
                code,
                message: message.into(),
            }),
            result: None,
        }
    }
}

/// One entry of a client read-receipt batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    /// Author of the message that was read.
    pub author: RecipientId,
    /// Message that was read.
    pub message_id: EventId,
}

/// Payload of a client `ReadReceipt` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipts {
    /// Receipts in the batch.
    #[serde(default)]
    pub receipts: Vec<ReadReceipt>,
}
