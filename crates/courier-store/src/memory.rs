//! In-memory [`OutboxStore`] with the same ordering semantics as `SQLite`.

use std::collections::HashMap;

use async_trait::async_trait;
use courier_core::{EventId, RecipientId, ServerPush};
use parking_lot::Mutex;

use crate::errors::Result;
use crate::store::OutboxStore;

/// Process-local outbox. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryOutbox {
    pending: Mutex<HashMap<RecipientId, Vec<ServerPush>>>,
}

impl MemoryOutbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total pending events across all recipients.
    pub fn len(&self) -> usize {
        self.pending.lock().values().map(Vec::len).sum()
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn append(&self, recipient: &RecipientId, event: &ServerPush) -> Result<()> {
        let mut pending = self.pending.lock();
        let queue = pending.entry(recipient.clone()).or_default();
        if let Some(existing) = queue.iter_mut().find(|e| e.id == event.id) {
            existing.kind = event.kind;
            existing.payload = event.payload.clone();
        } else {
            queue.push(event.for_recipient(recipient.clone()));
        }
        Ok(())
    }

    async fn list_ordered(&self, recipient: &RecipientId) -> Result<Vec<ServerPush>> {
        Ok(self
            .pending
            .lock()
            .get(recipient)
            .cloned()
            .unwrap_or_default())
    }

    async fn get(&self, recipient: &RecipientId, event_id: &EventId) -> Result<Option<ServerPush>> {
        Ok(self
            .pending
            .lock()
            .get(recipient)
            .and_then(|queue| queue.iter().find(|e| &e.id == event_id).cloned()))
    }

    async fn delete(&self, recipient: &RecipientId, event_id: &EventId) -> Result<bool> {
        let mut pending = self.pending.lock();
        let Some(queue) = pending.get_mut(recipient) else {
            return Ok(false);
        };
        let before = queue.len();
        queue.retain(|e| &e.id != event_id);
        let removed = queue.len() != before;
        if queue.is_empty() {
            let _ = pending.remove(recipient);
        }
        Ok(removed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
