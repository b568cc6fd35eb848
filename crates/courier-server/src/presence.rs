//! Presence table: last known presence per recipient and who wants to hear
//! about it.
//!
//! Created once per server and torn down at shutdown via [`PresenceTable::clear`].
//!
//! Online and offline transitions run under one lock and the offline side
//! re-checks the hub, so a reconnect racing the old connection's cleanup
//! never leaves a connected recipient recorded as offline.

use std::collections::HashMap;

use courier_core::{PresenceRecord, PushKind, RecipientId, ServerPush};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::errors::Result;
use crate::websocket::hub::{FanoutReport, Hub};

/// Presence records and subscriber lists.
#[derive(Default)]
pub struct PresenceTable {
    records: DashMap<RecipientId, PresenceRecord>,
    subscribers: RwLock<HashMap<RecipientId, Vec<RecipientId>>>,
    transitions: Mutex<()>,
}

impl PresenceTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `owner`'s presence. The record's owner is forced to `owner`.
    pub fn record_presence(&self, owner: &RecipientId, mut update: PresenceRecord) -> PresenceRecord {
        update.sent_by = owner.clone();
        let _ = self.records.insert(owner.clone(), update.clone());
        update
    }

    /// Last known presence of `owner`.
    pub fn get(&self, owner: &RecipientId) -> Option<PresenceRecord> {
        self.records.get(owner).map(|r| r.value().clone())
    }

    /// Number of owners with a presence record.
    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    /// Mark `owner` present.
    pub fn set_online(&self, owner: &RecipientId) -> PresenceRecord {
        self.record_presence(owner, PresenceRecord::online(owner.clone()))
    }

    /// Mark `owner` absent.
    pub fn set_offline(&self, owner: &RecipientId) -> PresenceRecord {
        self.record_presence(owner, PresenceRecord::offline(owner.clone()))
    }

    /// Add `subscriber` to `owner`'s list. Returns `false` if it was already
    /// subscribed.
    pub fn subscribe(&self, owner: &RecipientId, subscriber: RecipientId) -> bool {
        let mut subs = self.subscribers.write();
        let list = subs.entry(owner.clone()).or_default();
        if list.contains(&subscriber) {
            return false;
        }
        list.push(subscriber);
        true
    }

    /// Current subscribers of `owner`.
    pub fn subscribers(&self, owner: &RecipientId) -> Vec<RecipientId> {
        self.subscribers.read().get(owner).cloned().unwrap_or_default()
    }

    /// Remove `subscriber` from every owner's list.
    pub fn forget_subscriber(&self, subscriber: &RecipientId) {
        let mut subs = self.subscribers.write();
        subs.retain(|_, list| {
            list.retain(|s| s != subscriber);
            !list.is_empty()
        });
    }

    /// Push `record` to every current subscriber of `owner`.
    pub async fn notify_subscribers(
        &self,
        hub: &Hub,
        owner: &RecipientId,
        record: &PresenceRecord,
    ) -> Result<FanoutReport> {
        let subscribers = self.subscribers(owner);
        notify(hub, &subscribers, record).await
    }

    /// Owner connected: record it present and tell its subscribers.
    pub async fn connect(&self, hub: &Hub, owner: &RecipientId) -> Result<FanoutReport> {
        let (record, subscribers) = {
            let _guard = self.transitions.lock();
            (self.set_online(owner), self.subscribers(owner))
        };
        notify(hub, &subscribers, &record).await
    }

    /// Owner disconnected: record it offline, tell every subscriber exactly
    /// once, then drop the owner's list and its own subscriptions.
    ///
    /// Does nothing if the owner already has a live connection again.
    pub async fn disconnect(&self, hub: &Hub, owner: &RecipientId) -> Result<FanoutReport> {
        let (record, subscribers) = {
            let _guard = self.transitions.lock();
            if hub.is_online(owner) {
                debug!(owner = %owner, "owner reconnected, offline transition skipped");
                return Ok(FanoutReport::default());
            }
            let record = self.set_offline(owner);
            let subscribers = self.subscribers.write().remove(owner).unwrap_or_default();
            self.forget_subscriber(owner);
            (record, subscribers)
        };
        notify(hub, &subscribers, &record).await
    }

    /// Drop all records and subscriptions.
    pub fn clear(&self) {
        self.records.clear();
        self.subscribers.write().clear();
    }
}

/// Wrap a presence record in a push addressed to its owner.
pub fn presence_push(record: &PresenceRecord) -> Result<ServerPush> {
    Ok(ServerPush::new(
        record.sent_by.clone(),
        PushKind::AddPresence,
        serde_json::to_value(record)?,
    ))
}

async fn notify(hub: &Hub, subscribers: &[RecipientId], record: &PresenceRecord) -> Result<FanoutReport> {
    if subscribers.is_empty() {
        return Ok(FanoutReport::default());
    }
    let push = presence_push(record)?;
    let report = hub.send_to_members(subscribers, &push, false, None).await;
    debug!(
        owner = %record.sent_by,
        is_present = record.is_present,
        subscribers = subscribers.len(),
        queued = report.queued,
        "presence notified"
    );
    Ok(report)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
