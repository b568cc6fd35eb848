//! Boundary to domain logic for client events the core does not handle.

use async_trait::async_trait;
use courier_core::{ClientEvent, ClientKind, RecipientId};
use thiserror::Error;

use crate::errors::DeliveryError;

/// Why a domain handler rejected a client event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler for this kind.
    #[error("unsupported event kind: {0}")]
    Unsupported(ClientKind),
    /// Payload did not match what the handler expects.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// The handler's own sends failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    /// Any other handler failure.
    #[error("{0}")]
    Failed(String),
}

impl DispatchError {
    /// Numeric code reported to the client in a reply.
    pub fn code(&self) -> u32 {
        match self {
            Self::Unsupported(_) => 501,
            Self::InvalidPayload(_) => 400,
            Self::Delivery(_) => 503,
            Self::Failed(_) => 500,
        }
    }
}

/// Routes decoded client events to business logic.
///
/// Implementations deliver their results back through
/// [`Hub::send`](crate::websocket::hub::Hub::send) and friends.
#[async_trait]
pub trait DomainDispatcher: Send + Sync {
    /// Handle one event sent by `sender`.
    async fn dispatch(&self, sender: &RecipientId, event: ClientEvent) -> Result<(), DispatchError>;
}

/// Dispatcher that rejects every event. Used when the server runs without
/// domain handlers.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedDispatcher;

#[async_trait]
impl DomainDispatcher for UnsupportedDispatcher {
    async fn dispatch(&self, _sender: &RecipientId, event: ClientEvent) -> Result<(), DispatchError> {
        Err(DispatchError::Unsupported(event.kind))
    }
}
