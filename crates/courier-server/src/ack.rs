//! Acknowledgement transitions for durable events.
//!
//! A durable event stays in the outbox until its recipient acknowledges it.
//! Acknowledging a message-like event also tells its author it was
//! delivered.

use courier_core::{EventId, MessageReceipt, PushKind, ReceiptKind, RecipientId, ServerPush};
use metrics::counter;
use tracing::{debug, instrument};

use crate::errors::Result;
use crate::metrics::ACKS_TOTAL;
use crate::websocket::hub::Hub;

/// Result of an acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// The event was pending and has been removed from the outbox.
    Acknowledged {
        /// Whether a delivered receipt went to the author.
        receipt_sent: bool,
    },
    /// Delivery confirmed from a notification; the event stays pending.
    NotificationConfirmed {
        /// Whether a delivered receipt went to the author.
        receipt_sent: bool,
    },
    /// No pending event with this id (already acknowledged or never sent).
    Unknown,
}

impl AckOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Acknowledged { .. } => "acknowledged",
            Self::NotificationConfirmed { .. } => "notification",
            Self::Unknown => "unknown",
        }
    }
}

/// Acknowledge `event_id` for `recipient`: remove it from the outbox and
/// send the author a delivered receipt where the kind calls for one.
#[instrument(skip_all, fields(recipient = %recipient, event_id = %event_id))]
pub async fn acknowledge(hub: &Hub, recipient: &RecipientId, event_id: &EventId) -> Result<AckOutcome> {
    let outcome = match hub.outbox().get(recipient, event_id).await? {
        Some(event) => {
            // a concurrent ack may have removed it between get and delete
            if hub.outbox().delete(recipient, event_id).await? {
                let receipt_sent = send_delivered_receipt(hub, recipient, &event).await?;
                AckOutcome::Acknowledged { receipt_sent }
            } else {
                AckOutcome::Unknown
            }
        }
        None => AckOutcome::Unknown,
    };
    counter!(ACKS_TOTAL, "outcome" => outcome.label()).increment(1);
    debug!(?outcome, "ack processed");
    Ok(outcome)
}

/// Delivery confirmed by a push-notification path. The author is told, but
/// the event stays pending until the client itself acknowledges it.
#[instrument(skip_all, fields(recipient = %recipient, event_id = %event_id))]
pub async fn confirm_notification(
    hub: &Hub,
    recipient: &RecipientId,
    event_id: &EventId,
) -> Result<AckOutcome> {
    let outcome = match hub.outbox().get(recipient, event_id).await? {
        Some(event) => {
            let receipt_sent = send_delivered_receipt(hub, recipient, &event).await?;
            AckOutcome::NotificationConfirmed { receipt_sent }
        }
        None => AckOutcome::Unknown,
    };
    counter!(ACKS_TOTAL, "outcome" => outcome.label()).increment(1);
    Ok(outcome)
}

async fn send_delivered_receipt(hub: &Hub, recipient: &RecipientId, event: &ServerPush) -> Result<bool> {
    if !event.kind.sends_delivery_receipt() {
        return Ok(false);
    }
    let Some(author) = event.author() else {
        return Ok(false);
    };
    let receipt = MessageReceipt::now(ReceiptKind::Delivered, event.id.clone(), recipient.clone());
    let push = ServerPush::new(author.clone(), PushKind::MessageReceipt, serde_json::to_value(&receipt)?);
    let _ = hub.send(&author, &push, true).await?;
    Ok(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use courier_store::{MemoryOutbox, OutboxStore};
    use serde_json::json;

    use crate::groups::StaticGroups;

    fn hub() -> (Hub, Arc<MemoryOutbox>) {
        let outbox = Arc::new(MemoryOutbox::new());
        (Hub::new(outbox.clone(), Arc::new(StaticGroups::new()), 100), outbox)
    }

    fn event(kind: PushKind, id: &str) -> ServerPush {
        ServerPush {
            id: EventId::from(id),
            recipient: RecipientId::from("u1"),
            kind,
            payload: json!({"sentBy": "author", "text": "hello"}),
        }
    }

    #[tokio::test]
    async fn ack_removes_and_sends_receipt_to_author() {
        let (hub, outbox) = hub();
        let u1 = RecipientId::from("u1");
        let _ = hub.send(&u1, &event(PushKind::AddChatMessage, "m1"), true).await.unwrap();

        let outcome = acknowledge(&hub, &u1, &EventId::from("m1")).await.unwrap();
        assert_eq!(outcome, AckOutcome::Acknowledged { receipt_sent: true });
        assert!(outbox.list_ordered(&u1).await.unwrap().is_empty());

        let receipts = outbox.list_ordered(&RecipientId::from("author")).await.unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].kind, PushKind::MessageReceipt);
        assert_eq!(receipts[0].payload["type"], 2);
        assert_eq!(receipts[0].payload["messageId"], "m1");
        assert_eq!(receipts[0].payload["appUser"], "u1");
    }

    #[tokio::test]
    async fn ack_of_non_message_kind_sends_no_receipt() {
        let (hub, outbox) = hub();
        let u1 = RecipientId::from("u1");
        let _ = hub.send(&u1, &event(PushKind::AddGroup, "g1"), true).await.unwrap();

        let outcome = acknowledge(&hub, &u1, &EventId::from("g1")).await.unwrap();
        assert_eq!(outcome, AckOutcome::Acknowledged { receipt_sent: false });
        assert!(outbox.is_empty());
    }

    #[tokio::test]
    async fn duplicate_ack_is_unknown() {
        let (hub, _outbox) = hub();
        let u1 = RecipientId::from("u1");
        let _ = hub.send(&u1, &event(PushKind::AddGroup, "g1"), true).await.unwrap();

        let _ = acknowledge(&hub, &u1, &EventId::from("g1")).await.unwrap();
        let again = acknowledge(&hub, &u1, &EventId::from("g1")).await.unwrap();
        assert_eq!(again, AckOutcome::Unknown);
    }

    #[tokio::test]
    async fn ack_is_scoped_to_recipient() {
        let (hub, outbox) = hub();
        let u1 = RecipientId::from("u1");
        let _ = hub.send(&u1, &event(PushKind::AddGroup, "g1"), true).await.unwrap();

        let outcome = acknowledge(&hub, &RecipientId::from("u2"), &EventId::from("g1"))
            .await
            .unwrap();
        assert_eq!(outcome, AckOutcome::Unknown);
        assert_eq!(outbox.len(), 1);
    }

    #[tokio::test]
    async fn notification_confirmation_keeps_event_pending() {
        let (hub, outbox) = hub();
        let u1 = RecipientId::from("u1");
        let _ = hub.send(&u1, &event(PushKind::AddTaskMessage, "t1"), true).await.unwrap();

        let outcome = confirm_notification(&hub, &u1, &EventId::from("t1")).await.unwrap();
        assert_eq!(outcome, AckOutcome::NotificationConfirmed { receipt_sent: true });
        assert_eq!(outbox.list_ordered(&u1).await.unwrap().len(), 1);
        assert_eq!(
            outbox.list_ordered(&RecipientId::from("author")).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn missing_author_skips_receipt() {
        let (hub, _outbox) = hub();
        let u1 = RecipientId::from("u1");
        let mut anonymous = event(PushKind::AddChatMessage, "m1");
        anonymous.payload = json!({"text": "no author"});
        let _ = hub.send(&u1, &anonymous, true).await.unwrap();

        let outcome = acknowledge(&hub, &u1, &EventId::from("m1")).await.unwrap();
        assert_eq!(outcome, AckOutcome::Acknowledged { receipt_sent: false });
    }
}
