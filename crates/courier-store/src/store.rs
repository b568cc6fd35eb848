//! The [`OutboxStore`] abstraction.
//!
//! An outbox holds every event sent with `needs_ack = true` from the moment
//! it is handed to the hub until the recipient acknowledges it. Entries are
//! keyed by `(recipient, event id)` and listed in insertion order.

use async_trait::async_trait;
use courier_core::{EventId, RecipientId, ServerPush};

use crate::errors::Result;

/// Durable per-recipient storage of pending events.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Persist `event` for `recipient`.
    ///
    /// Appending an id that is already pending for the recipient replaces its
    /// kind and payload but keeps its position.
    async fn append(&self, recipient: &RecipientId, event: &ServerPush) -> Result<()>;

    /// All pending events for `recipient`, oldest first.
    async fn list_ordered(&self, recipient: &RecipientId) -> Result<Vec<ServerPush>>;

    /// Fetch a single pending event.
    async fn get(&self, recipient: &RecipientId, event_id: &EventId) -> Result<Option<ServerPush>>;

    /// Remove a pending event. Returns whether an entry was removed.
    async fn delete(&self, recipient: &RecipientId, event_id: &EventId) -> Result<bool>;
}
