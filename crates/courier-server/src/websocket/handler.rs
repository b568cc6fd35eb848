//! Handling of decoded client events.
//!
//! Pings, acks, read receipts and presence updates are handled here; every
//! other kind goes to the [`DomainDispatcher`](crate::dispatch::DomainDispatcher).
//! Failures are answered with an error reply and never close the connection.

use chrono::Utc;
use courier_core::{
    ClientEvent, ClientKind, ClientReply, EventId, MessageReceipt, PresenceRecord, PushKind,
    ReadReceipts, ReceiptKind, RecipientId, ServerPush,
};
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::ack;
use crate::context::DeliveryContext;
use crate::dispatch::DispatchError;
use crate::errors::DeliveryError;
use crate::metrics::DISPATCH_FAILURES_TOTAL;
use crate::presence::presence_push;

/// Presence update as sent by a client. The owner and timestamp are set
/// server-side.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PresenceUpdate {
    is_present: Option<bool>,
    chat_id: String,
    task_id: String,
    is_typing: bool,
}

/// Handle one client event from `sender`.
#[instrument(skip_all, fields(recipient = %sender, sequence = event.sequence, kind = %event.kind))]
pub async fn handle_client_event(ctx: &DeliveryContext, sender: &RecipientId, event: ClientEvent) {
    let sequence = event.sequence;
    let kind = event.kind;

    let result = match kind {
        ClientKind::Ping => reply(ctx, sender, &ClientReply::ok(sequence))
            .await
            .map_err(DispatchError::from),
        ClientKind::Ack => handle_ack(ctx, sender, &event).await,
        ClientKind::ReadReceipt => handle_read_receipts(ctx, sender, &event).await,
        ClientKind::AddPresence => handle_presence(ctx, sender, &event).await,
        _ => ctx.dispatcher.dispatch(sender, event).await,
    };

    if let Err(e) = result {
        counter!(DISPATCH_FAILURES_TOTAL, "kind" => kind.label()).increment(1);
        warn!(error = %e, code = e.code(), "client event failed");
        let error_reply = ClientReply::error(sequence, e.code(), e.to_string());
        if let Err(e) = reply(ctx, sender, &error_reply).await {
            warn!(error = %e, "failed to send error reply");
        }
    }
}

/// Fire-and-forget reply correlated with a client sequence.
async fn reply(ctx: &DeliveryContext, sender: &RecipientId, body: &ClientReply) -> Result<(), DeliveryError> {
    let push = ServerPush::new(sender.clone(), PushKind::ClientReply, serde_json::to_value(body)?);
    let _ = ctx.hub.send(sender, &push, false).await?;
    Ok(())
}

async fn handle_ack(ctx: &DeliveryContext, sender: &RecipientId, event: &ClientEvent) -> Result<(), DispatchError> {
    let event_id = event
        .payload
        .as_str()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DispatchError::InvalidPayload("ack data must be an event id string".into()))?;
    let outcome = ack::acknowledge(&ctx.hub, sender, &EventId::from(event_id)).await?;
    debug!(event_id, ?outcome, "client ack");
    Ok(())
}

async fn handle_read_receipts(
    ctx: &DeliveryContext,
    sender: &RecipientId,
    event: &ClientEvent,
) -> Result<(), DispatchError> {
    let batch: ReadReceipts = event
        .payload_as()
        .map_err(|e| DispatchError::InvalidPayload(e.to_string()))?;
    for read in batch.receipts {
        let receipt = MessageReceipt::now(ReceiptKind::Read, read.message_id, sender.clone());
        let push = ServerPush::new(
            read.author.clone(),
            PushKind::MessageReceipt,
            serde_json::to_value(&receipt).map_err(DeliveryError::from)?,
        );
        let _ = ctx.hub.send(&read.author, &push, true).await?;
    }
    Ok(())
}

async fn handle_presence(ctx: &DeliveryContext, sender: &RecipientId, event: &ClientEvent) -> Result<(), DispatchError> {
    let update: PresenceUpdate = event
        .payload_as()
        .map_err(|e| DispatchError::InvalidPayload(e.to_string()))?;
    let record = ctx.presence.record_presence(
        sender,
        PresenceRecord {
            id: EventId::new(),
            is_present: update.is_present.unwrap_or(true),
            chat_id: update.chat_id,
            task_id: update.task_id,
            is_typing: update.is_typing,
            sent_by: sender.clone(),
            timestamp: Utc::now(),
        },
    );

    if record.chat_id.is_empty() {
        let _ = ctx.presence.notify_subscribers(&ctx.hub, sender, &record).await?;
    } else {
        let push = presence_push(&record)?;
        let _ = ctx
            .hub
            .send_to_group(&record.chat_id, &push, false, Some(sender))
            .await?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use courier_store::{MemoryOutbox, OutboxStore};
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use crate::config::DeliveryConfig;
    use crate::dispatch::{DomainDispatcher, UnsupportedDispatcher};
    use crate::groups::StaticGroups;
    use crate::presence::PresenceTable;
    use crate::websocket::connection::ConnectionHandle;
    use crate::websocket::hub::Hub;

    #[derive(Default)]
    struct RecordingDispatcher {
        seen: Mutex<Vec<(RecipientId, ClientKind)>>,
    }

    #[async_trait]
    impl DomainDispatcher for RecordingDispatcher {
        async fn dispatch(&self, sender: &RecipientId, event: ClientEvent) -> Result<(), DispatchError> {
            self.seen.lock().push((sender.clone(), event.kind));
            Ok(())
        }
    }

    struct Fixture {
        ctx: DeliveryContext,
        outbox: Arc<MemoryOutbox>,
        groups: Arc<StaticGroups>,
    }

    fn fixture(dispatcher: Arc<dyn DomainDispatcher>) -> Fixture {
        let outbox = Arc::new(MemoryOutbox::new());
        let groups = Arc::new(StaticGroups::new());
        let hub = Arc::new(Hub::new(outbox.clone(), groups.clone(), 100));
        let ctx = DeliveryContext {
            hub,
            presence: Arc::new(PresenceTable::new()),
            dispatcher,
            config: DeliveryConfig::default(),
        };
        Fixture { ctx, outbox, groups }
    }

    fn connect(hub: &Hub, recipient: &str) -> mpsc::Receiver<ServerPush> {
        let (tx, rx) = mpsc::channel(16);
        let conn = Arc::new(ConnectionHandle::new(
            RecipientId::from(recipient),
            tx,
            hub.lifetime_token(),
        ));
        let _ = hub.register(conn).unwrap();
        rx
    }

    fn client_event(sequence: u32, kind: ClientKind, payload: Value) -> ClientEvent {
        ClientEvent {
            sequence,
            kind,
            payload,
        }
    }

    #[tokio::test]
    async fn ping_gets_unpersisted_reply() {
        let f = fixture(Arc::new(UnsupportedDispatcher));
        let mut rx = connect(&f.ctx.hub, "u1");
        let u1 = RecipientId::from("u1");

        handle_client_event(&f.ctx, &u1, client_event(7, ClientKind::Ping, Value::Null)).await;

        let push = rx.recv().await.unwrap();
        assert_eq!(push.kind, PushKind::ClientReply);
        assert_eq!(push.payload, json!({"id": 7}));
        assert!(f.outbox.is_empty());
    }

    #[tokio::test]
    async fn ack_removes_pending_event() {
        let f = fixture(Arc::new(UnsupportedDispatcher));
        let u1 = RecipientId::from("u1");
        let pending = ServerPush::new(u1.clone(), PushKind::AddChat, json!({}));
        let _ = f.ctx.hub.send(&u1, &pending, true).await.unwrap();

        handle_client_event(
            &f.ctx,
            &u1,
            client_event(1, ClientKind::Ack, json!(pending.id.as_str())),
        )
        .await;
        assert!(f.outbox.is_empty());
    }

    #[tokio::test]
    async fn malformed_ack_gets_error_reply() {
        let f = fixture(Arc::new(UnsupportedDispatcher));
        let mut rx = connect(&f.ctx.hub, "u1");

        handle_client_event(
            &f.ctx,
            &RecipientId::from("u1"),
            client_event(3, ClientKind::Ack, json!({"not": "a string"})),
        )
        .await;

        let push = rx.recv().await.unwrap();
        assert_eq!(push.payload["id"], 3);
        assert_eq!(push.payload["error"]["code"], 400);
    }

    #[tokio::test]
    async fn read_receipts_go_to_authors() {
        let f = fixture(Arc::new(UnsupportedDispatcher));
        let payload = json!({"receipts": [
            {"author": "a1", "messageId": "m1"},
            {"author": "a2", "messageId": "m2"},
        ]});

        handle_client_event(
            &f.ctx,
            &RecipientId::from("reader"),
            client_event(1, ClientKind::ReadReceipt, payload),
        )
        .await;

        let a1 = f.outbox.list_ordered(&RecipientId::from("a1")).await.unwrap();
        assert_eq!(a1.len(), 1);
        assert_eq!(a1[0].kind, PushKind::MessageReceipt);
        assert_eq!(a1[0].payload["type"], 3);
        assert_eq!(a1[0].payload["appUser"], "reader");
        assert_eq!(f.outbox.len(), 2);
    }

    #[tokio::test]
    async fn presence_without_chat_goes_to_subscribers() {
        let f = fixture(Arc::new(UnsupportedDispatcher));
        let owner = RecipientId::from("u1");
        let mut rx = connect(&f.ctx.hub, "watcher");
        let _ = f.ctx.presence.subscribe(&owner, RecipientId::from("watcher"));

        handle_client_event(
            &f.ctx,
            &owner,
            client_event(1, ClientKind::AddPresence, json!({"isTyping": true, "sentBy": "spoof"})),
        )
        .await;

        let push = rx.recv().await.unwrap();
        assert_eq!(push.kind, PushKind::AddPresence);
        assert_eq!(push.payload["sentBy"], "u1");
        assert_eq!(push.payload["isTyping"], true);
        assert!(f.ctx.presence.get(&owner).unwrap().is_typing);
        assert!(f.outbox.is_empty());
    }

    #[tokio::test]
    async fn presence_with_chat_fans_out_to_group_except_sender() {
        let f = fixture(Arc::new(UnsupportedDispatcher));
        f.groups
            .set_members("chat-1", ["u1", "u2"].map(RecipientId::from).to_vec());
        let mut own = connect(&f.ctx.hub, "u1");
        let mut peer = connect(&f.ctx.hub, "u2");

        handle_client_event(
            &f.ctx,
            &RecipientId::from("u1"),
            client_event(1, ClientKind::AddPresence, json!({"chatId": "chat-1", "isTyping": true})),
        )
        .await;

        let push = peer.recv().await.unwrap();
        assert_eq!(push.payload["chatId"], "chat-1");
        assert!(own.try_recv().is_err());
    }

    #[tokio::test]
    async fn other_kinds_reach_dispatcher() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let f = fixture(dispatcher.clone());

        handle_client_event(
            &f.ctx,
            &RecipientId::from("u1"),
            client_event(1, ClientKind::AddChatMessage, json!({"text": "hi"})),
        )
        .await;
        handle_client_event(
            &f.ctx,
            &RecipientId::from("u1"),
            client_event(2, ClientKind::Unknown(99), Value::Null),
        )
        .await;

        let seen = dispatcher.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, ClientKind::AddChatMessage);
        assert_eq!(seen[1].1, ClientKind::Unknown(99));
    }

    #[tokio::test]
    async fn dispatcher_error_becomes_reply() {
        let f = fixture(Arc::new(UnsupportedDispatcher));
        let mut rx = connect(&f.ctx.hub, "u1");

        handle_client_event(
            &f.ctx,
            &RecipientId::from("u1"),
            client_event(9, ClientKind::AddTask, Value::Null),
        )
        .await;

        let push = rx.recv().await.unwrap();
        assert_eq!(push.kind, PushKind::ClientReply);
        assert_eq!(push.payload["id"], 9);
        assert_eq!(push.payload["error"]["code"], 501);
    }
}
