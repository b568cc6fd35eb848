//! # courier-core
//!
//! Shared vocabulary of the courier delivery core:
//!
//! - **Branded IDs**: [`RecipientId`], [`EventId`], [`ConnectionId`]
//! - **Wire protocol**: [`ServerPush`], [`ClientEvent`] and their integer kinds
//! - **Built-in payloads**: presence records, message receipts, client replies
//! - **Errors**: [`FrameError`] for inbound/outbound frame handling
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::FrameError;
pub use ids::{ConnectionId, EventId, RecipientId};
pub use protocol::{
    ClientEvent, ClientKind, ClientReply, MessageReceipt, PresenceRecord, PushKind, ReadReceipt,
    ReadReceipts, ReceiptKind, ReplyError, ServerPush,
};
