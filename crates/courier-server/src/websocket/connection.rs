//! Handle to one live client connection.
//!
//! The hub and fan-out paths only ever touch a connection through this
//! handle: they enqueue onto its bounded outbound queue and may cancel its
//! lifetime. The transport itself is owned by the session loops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use courier_core::{ConnectionId, RecipientId, ServerPush};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Result of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueue {
    /// The event is on the outbound queue.
    Queued,
    /// The queue is at capacity; the event was not queued.
    Full,
    /// The outbound loop has exited.
    Closed,
}

/// A registered connection for one recipient.
pub struct ConnectionHandle {
    /// Unique id of this connection (distinguishes reconnects).
    pub id: ConnectionId,
    /// Authenticated recipient.
    pub recipient: RecipientId,
    tx: mpsc::Sender<ServerPush>,
    lifetime: CancellationToken,
    /// When the connection was accepted.
    pub connected_at: Instant,
    dropped: AtomicU64,
}

impl ConnectionHandle {
    /// Create a handle around an outbound queue sender and a lifetime token.
    pub fn new(
        recipient: RecipientId,
        tx: mpsc::Sender<ServerPush>,
        lifetime: CancellationToken,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            recipient,
            tx,
            lifetime,
            connected_at: Instant::now(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event without waiting for queue space.
    pub fn enqueue(&self, event: ServerPush) -> Enqueue {
        match self.tx.try_send(event) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Enqueue::Full
            }
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Cancel the connection's lifetime, waking both loops.
    pub fn close(&self) {
        self.lifetime.cancel();
    }

    /// Whether the lifetime has been cancelled.
    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// The connection's lifetime token.
    pub fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    /// Live pushes dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("recipient", &self.recipient)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::PushKind;
    use serde_json::Value;

    fn make_handle(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<ServerPush>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ConnectionHandle::new(RecipientId::from("u1"), tx, CancellationToken::new());
        (handle, rx)
    }

    fn push() -> ServerPush {
        ServerPush::new(RecipientId::from("u1"), PushKind::SystemMessage, Value::Null)
    }

    #[tokio::test]
    async fn enqueue_delivers_in_order() {
        let (handle, mut rx) = make_handle(8);
        let first = push();
        let second = push();
        assert_eq!(handle.enqueue(first.clone()), Enqueue::Queued);
        assert_eq!(handle.enqueue(second.clone()), Enqueue::Queued);
        assert_eq!(rx.recv().await.unwrap().id, first.id);
        assert_eq!(rx.recv().await.unwrap().id, second.id);
    }

    #[test]
    fn full_queue_counts_drop() {
        let (handle, _rx) = make_handle(1);
        assert_eq!(handle.enqueue(push()), Enqueue::Queued);
        assert_eq!(handle.enqueue(push()), Enqueue::Full);
        assert_eq!(handle.enqueue(push()), Enqueue::Full);
        assert_eq!(handle.drop_count(), 2);
    }

    #[test]
    fn closed_receiver_reports_closed() {
        let (handle, rx) = make_handle(4);
        drop(rx);
        assert_eq!(handle.enqueue(push()), Enqueue::Closed);
        assert_eq!(handle.drop_count(), 0);
    }

    #[test]
    fn close_cancels_lifetime() {
        let (handle, _rx) = make_handle(4);
        let token = handle.lifetime().clone();
        assert!(!handle.is_closed());
        handle.close();
        assert!(handle.is_closed());
        assert!(token.is_cancelled());
    }

    #[test]
    fn ids_are_unique_per_handle() {
        let (a, _ra) = make_handle(1);
        let (b, _rb) = make_handle(1);
        assert_ne!(a.id, b.id);
        assert_eq!(a.recipient, b.recipient);
    }
}
