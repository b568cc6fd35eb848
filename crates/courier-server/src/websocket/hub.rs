//! Connection registry and the send primitives domain code delivers through.
//!
//! The registry maps each recipient to at most one live [`ConnectionHandle`].
//! Mutations (register/unregister) take the write lock; fan-out lookups take
//! the read lock only long enough to clone the handle, so a slow consumer
//! never holds up delivery to anyone else.
//!
//! Sends to one recipient are serialized through a striped lock held across
//! the outbox append and the live enqueue, so the live queue sees events in
//! the same order the outbox stored them.

use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use courier_core::{RecipientId, ServerPush};
use courier_store::OutboxStore;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::errors::{DeliveryError, Result};
use crate::groups::GroupMembership;
use crate::metrics::{
    EVENTS_DROPPED_TOTAL, EVENTS_SENT_TOTAL, OUTBOX_APPEND_FAILURES_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_SUPERSEDED_TOTAL,
};

use super::connection::{ConnectionHandle, Enqueue};

const SEND_LOCK_STRIPES: u64 = 64;

/// What happened to a single send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Placed on the recipient's outbound queue.
    Queued,
    /// Recipient has no live connection.
    Offline,
    /// Recipient's queue was full; the live push was dropped.
    Dropped,
}

/// Per-recipient tally of a fan-out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Sends placed on a live queue.
    pub queued: usize,
    /// Recipients with no live connection.
    pub offline: usize,
    /// Live pushes dropped on a full queue.
    pub dropped: usize,
    /// Recipients whose durable write failed.
    pub failed: Vec<RecipientId>,
}

impl FanoutReport {
    fn record(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Queued => self.queued += 1,
            SendOutcome::Offline => self.offline += 1,
            SendOutcome::Dropped => self.dropped += 1,
        }
    }

    /// Number of recipients a send was attempted for.
    pub fn attempted(&self) -> usize {
        self.queued + self.offline + self.dropped + self.failed.len()
    }

    /// Whether every durable write succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Single-process connection registry.
pub struct Hub {
    connections: RwLock<HashMap<RecipientId, Arc<ConnectionHandle>>>,
    send_locks: Box<[Mutex<()>]>,
    stripe_hasher: RandomState,
    outbox: Arc<dyn OutboxStore>,
    groups: Arc<dyn GroupMembership>,
    max_connections: usize,
    root: CancellationToken,
    tracker: TaskTracker,
    shutting_down: AtomicBool,
    closed: CancellationToken,
}

impl Hub {
    /// Create a hub over an outbox and a membership source.
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        groups: Arc<dyn GroupMembership>,
        max_connections: usize,
    ) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            send_locks: (0..SEND_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            stripe_hasher: RandomState::new(),
            outbox,
            groups,
            max_connections,
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            shutting_down: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    /// The outbox backing durable sends.
    pub fn outbox(&self) -> &Arc<dyn OutboxStore> {
        &self.outbox
    }

    /// A fresh lifetime token for a new connection, cancelled at shutdown.
    pub fn lifetime_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Tracks connection loops and in-flight dispatch tasks.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Install `conn` for its recipient.
    ///
    /// A connection already registered for the recipient is replaced and
    /// closed; it is returned so the caller can log it.
    pub fn register(&self, conn: Arc<ConnectionHandle>) -> Result<Option<Arc<ConnectionHandle>>> {
        let mut map = self.connections.write();
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(DeliveryError::ShuttingDown);
        }
        if !map.contains_key(&conn.recipient) && map.len() >= self.max_connections {
            return Err(DeliveryError::AtCapacity {
                limit: self.max_connections,
            });
        }

        let recipient = conn.recipient.clone();
        let conn_id = conn.id.clone();
        let previous = map.insert(recipient.clone(), conn);
        drop(map);

        match &previous {
            Some(old) => {
                info!(recipient = %recipient, conn_id = %conn_id, superseded = %old.id, "connection superseded");
                counter!(WS_CONNECTIONS_SUPERSEDED_TOTAL).increment(1);
                old.close();
            }
            None => {
                debug!(recipient = %recipient, conn_id = %conn_id, "connection registered");
                gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
            }
        }
        Ok(previous)
    }

    /// Remove `conn` if it is still the registered connection for its
    /// recipient. Returns whether an entry was removed.
    pub fn unregister(&self, conn: &ConnectionHandle) -> bool {
        let mut map = self.connections.write();
        let current = map.get(&conn.recipient).is_some_and(|c| c.id == conn.id);
        if current {
            let _ = map.remove(&conn.recipient);
            drop(map);
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
            debug!(recipient = %conn.recipient, conn_id = %conn.id, "connection unregistered");
        } else {
            debug!(recipient = %conn.recipient, conn_id = %conn.id, "stale connection, registry untouched");
        }
        current
    }

    /// Live connection for a recipient.
    pub fn connection(&self, recipient: &RecipientId) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().get(recipient).cloned()
    }

    /// Whether the recipient has a live connection.
    pub fn is_online(&self, recipient: &RecipientId) -> bool {
        self.connections.read().contains_key(recipient)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Exclusive send slot for `recipient`. While held, no other send to the
    /// recipient can append or enqueue.
    pub async fn lock_recipient(&self, recipient: &RecipientId) -> MutexGuard<'_, ()> {
        let stripe =
            usize::try_from(self.stripe_hasher.hash_one(recipient) % SEND_LOCK_STRIPES).unwrap_or_default();
        self.send_locks[stripe].lock().await
    }

    /// Deliver `event` to `recipient`.
    ///
    /// With `needs_ack` the event is written to the outbox before any live
    /// delivery is attempted; a failed write is returned and nothing is
    /// queued. The live enqueue never waits for queue space. Sends to the
    /// same recipient reach its queue in the order their appends completed.
    #[instrument(skip_all, fields(recipient = %recipient, event_id = %event.id, kind = %event.kind, needs_ack = needs_ack))]
    pub async fn send(
        &self,
        recipient: &RecipientId,
        event: &ServerPush,
        needs_ack: bool,
    ) -> Result<SendOutcome> {
        let event = event.for_recipient(recipient.clone());
        let _slot = self.lock_recipient(recipient).await;
        if needs_ack {
            if let Err(e) = self.outbox.append(recipient, &event).await {
                counter!(OUTBOX_APPEND_FAILURES_TOTAL).increment(1);
                warn!(error = %e, "outbox append failed");
                return Err(e.into());
            }
        }

        let Some(conn) = self.connection(recipient) else {
            debug!("recipient offline");
            return Ok(SendOutcome::Offline);
        };

        match conn.enqueue(event) {
            Enqueue::Queued => {
                counter!(EVENTS_SENT_TOTAL, "durable" => needs_ack.to_string()).increment(1);
                Ok(SendOutcome::Queued)
            }
            Enqueue::Full => {
                counter!(EVENTS_DROPPED_TOTAL).increment(1);
                warn!(conn_id = %conn.id, dropped = conn.drop_count(), "outbound queue full, push dropped");
                Ok(SendOutcome::Dropped)
            }
            Enqueue::Closed => Ok(SendOutcome::Offline),
        }
    }

    /// Deliver `event` to each of `members` except `excluding`.
    ///
    /// A failure for one member does not stop delivery to the rest; failed
    /// members are listed in the report.
    pub async fn send_to_members(
        &self,
        members: &[RecipientId],
        event: &ServerPush,
        needs_ack: bool,
        excluding: Option<&RecipientId>,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();
        for member in members {
            if excluding == Some(member) {
                continue;
            }
            match self.send(member, event, needs_ack).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(recipient = %member, event_id = %event.id, error = %e, "fan-out send failed");
                    report.failed.push(member.clone());
                }
            }
        }
        report
    }

    /// Deliver `event` to every member of `group_id` except `excluding`.
    pub async fn send_to_group(
        &self,
        group_id: &str,
        event: &ServerPush,
        needs_ack: bool,
        excluding: Option<&RecipientId>,
    ) -> Result<FanoutReport> {
        let members = self.groups.list_members(group_id).await?;
        let report = self
            .send_to_members(&members, event, needs_ack, excluding)
            .await;
        debug!(
            group_id,
            event_id = %event.id,
            queued = report.queued,
            offline = report.offline,
            dropped = report.dropped,
            failed = report.failed.len(),
            "group fan-out"
        );
        Ok(report)
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stop accepting registrations, close every connection and wait for
    /// all tracked tasks to finish.
    ///
    /// Completes once; concurrent and later callers wait for the same
    /// completion.
    pub async fn shutdown(&self) {
        let first = {
            let _map = self.connections.write();
            !self.shutting_down.swap(true, Ordering::AcqRel)
        };
        if !first {
            self.closed.cancelled().await;
            return;
        }

        info!(connections = self.connection_count(), "hub shutting down");
        self.root.cancel();
        let _ = self.tracker.close();
        self.tracker.wait().await;
        self.closed.cancel();
        info!("hub shut down");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
