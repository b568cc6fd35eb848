//! Delivery error types.

use courier_store::OutboxError;
use thiserror::Error;

use crate::groups::MembershipError;

/// Errors surfaced to callers of the hub's send primitives.
///
/// A recipient that is not connected is not an error; see
/// [`SendOutcome::Offline`](crate::websocket::hub::SendOutcome::Offline).
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Durable event could not be persisted; it may be lost unless retried.
    #[error("outbox write failed: {0}")]
    Outbox(#[from] OutboxError),

    /// The hub no longer accepts connections.
    #[error("delivery hub is shutting down")]
    ShuttingDown,

    /// The connection limit has been reached.
    #[error("connection limit of {limit} reached")]
    AtCapacity {
        /// Configured limit.
        limit: usize,
    },

    /// Group members could not be resolved.
    #[error("group lookup failed: {0}")]
    Membership(#[from] MembershipError),

    /// A built-in payload could not be serialized.
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Convenience alias for delivery results.
pub type Result<T> = std::result::Result<T, DeliveryError>;
