//! Outbox repository: SQL for the `outbox` table.
//!
//! Stateless; every method takes `&Connection`.

use courier_core::{EventId, PushKind, RecipientId, ServerPush};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;

/// Outbox repository.
pub struct OutboxRepo;

impl OutboxRepo {
    /// Insert a pending event, or refresh kind/payload of an existing one.
    ///
    /// The payload is stored as JSON text, so `null` is kept as `"null"`.
    pub fn append(conn: &Connection, recipient: &RecipientId, event: &ServerPush) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)?;
        let _ = conn.execute(
            "INSERT INTO outbox (recipient, event_id, kind, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT (recipient, event_id)
             DO UPDATE SET kind = excluded.kind, payload = excluded.payload",
            params![
                recipient.as_str(),
                event.id.as_str(),
                i16::from(event.kind),
                payload,
            ],
        )?;
        Ok(())
    }

    /// Pending events for a recipient in insertion order.
    pub fn list_ordered(conn: &Connection, recipient: &RecipientId) -> Result<Vec<ServerPush>> {
        let mut stmt = conn.prepare_cached(
            "SELECT recipient, event_id, kind, payload
             FROM outbox WHERE recipient = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![recipient.as_str()], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// A single pending event.
    pub fn get(
        conn: &Connection,
        recipient: &RecipientId,
        event_id: &EventId,
    ) -> Result<Option<ServerPush>> {
        let row = conn
            .query_row(
                "SELECT recipient, event_id, kind, payload
                 FROM outbox WHERE recipient = ?1 AND event_id = ?2",
                params![recipient.as_str(), event_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Delete a pending event. Returns whether a row was removed.
    pub fn delete(conn: &Connection, recipient: &RecipientId, event_id: &EventId) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM outbox WHERE recipient = ?1 AND event_id = ?2",
            params![recipient.as_str(), event_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Number of pending events across all recipients.
    pub fn count(conn: &Connection) -> Result<u64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<ServerPush> {
        let recipient: String = row.get(0)?;
        let event_id: String = row.get(1)?;
        let kind: i16 = row.get(2)?;
        let raw: String = row.get(3)?;
        let payload = serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        Ok(ServerPush {
            id: EventId::from_string(event_id),
            recipient: RecipientId::from_string(recipient),
            kind: PushKind::from(kind),
            payload,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::connection::{ConnectionConfig, new_in_memory};
    use crate::sqlite::migrations::run_migrations;
    use serde_json::json;

    fn setup() -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn push(recipient: &str, id: &str, payload: serde_json::Value) -> ServerPush {
        ServerPush {
            id: EventId::from(id),
            recipient: RecipientId::from(recipient),
            kind: PushKind::AddChatMessage,
            payload,
        }
    }

    #[test]
    fn append_and_list_in_insertion_order() {
        let conn = setup();
        let u1 = RecipientId::from("u1");
        for id in ["c", "a", "b"] {
            OutboxRepo::append(&conn, &u1, &push("u1", id, json!({"n": id}))).unwrap();
        }
        let ids: Vec<String> = OutboxRepo::list_ordered(&conn, &u1)
            .unwrap()
            .into_iter()
            .map(|e| e.id.into_inner())
            .collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn reappend_replaces_payload_and_keeps_position() {
        let conn = setup();
        let u1 = RecipientId::from("u1");
        OutboxRepo::append(&conn, &u1, &push("u1", "m1", json!({"v": 1}))).unwrap();
        OutboxRepo::append(&conn, &u1, &push("u1", "m2", json!({"v": 2}))).unwrap();
        OutboxRepo::append(&conn, &u1, &push("u1", "m1", json!({"v": 3}))).unwrap();

        let events = OutboxRepo::list_ordered(&conn, &u1).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_str(), "m1");
        assert_eq!(events[0].payload, json!({"v": 3}));
        assert_eq!(OutboxRepo::count(&conn).unwrap(), 2);
    }

    #[test]
    fn recipients_are_isolated() {
        let conn = setup();
        OutboxRepo::append(&conn, &RecipientId::from("u1"), &push("u1", "m1", json!({}))).unwrap();
        OutboxRepo::append(&conn, &RecipientId::from("u2"), &push("u2", "m1", json!({}))).unwrap();

        let u2 = OutboxRepo::list_ordered(&conn, &RecipientId::from("u2")).unwrap();
        assert_eq!(u2.len(), 1);
        assert_eq!(u2[0].recipient.as_str(), "u2");
        assert!(
            OutboxRepo::delete(&conn, &RecipientId::from("u1"), &EventId::from("m1")).unwrap()
        );
        assert!(
            OutboxRepo::get(&conn, &RecipientId::from("u2"), &EventId::from("m1"))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn get_and_delete_missing() {
        let conn = setup();
        let u1 = RecipientId::from("u1");
        let missing = EventId::from("nope");
        assert!(OutboxRepo::get(&conn, &u1, &missing).unwrap().is_none());
        assert!(!OutboxRepo::delete(&conn, &u1, &missing).unwrap());
    }

    #[test]
    fn unknown_kind_round_trips() {
        let conn = setup();
        let u1 = RecipientId::from("u1");
        let mut event = push("u1", "m1", json!(null));
        event.kind = PushKind::Unknown(99);
        OutboxRepo::append(&conn, &u1, &event).unwrap();
        let stored = OutboxRepo::get(&conn, &u1, &EventId::from("m1")).unwrap().unwrap();
        assert_eq!(stored.kind, PushKind::Unknown(99));
        assert!(stored.payload.is_null());
    }

    #[test]
    fn scalar_payloads_round_trip() {
        let conn = setup();
        let u1 = RecipientId::from("u1");
        let payloads = [json!(null), json!("chat-42"), json!(7), json!(true), json!([1, 2])];
        for (i, payload) in payloads.iter().enumerate() {
            let id = format!("m{i}");
            OutboxRepo::append(&conn, &u1, &push("u1", &id, payload.clone())).unwrap();
            let stored = OutboxRepo::get(&conn, &u1, &EventId::from(id.as_str())).unwrap().unwrap();
            assert_eq!(&stored.payload, payload);
        }
        assert_eq!(OutboxRepo::list_ordered(&conn, &u1).unwrap().len(), payloads.len());
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let conn = setup();
        let _ = conn
            .execute(
                "INSERT INTO outbox (recipient, event_id, kind, payload, created_at)
                 VALUES ('u1', 'bad', 3, '{not json', 'now')",
                [],
            )
            .unwrap();
        assert!(OutboxRepo::get(&conn, &RecipientId::from("u1"), &EventId::from("bad")).is_err());
    }
}
