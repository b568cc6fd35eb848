//! Outbox contents survive closing and reopening the database file.

use std::sync::Arc;

use courier_core::{EventId, PushKind, RecipientId, ServerPush};
use courier_store::{ConnectionConfig, MemoryOutbox, OutboxStore, SqliteOutbox};
use serde_json::json;

fn event(recipient: &RecipientId, id: &str) -> ServerPush {
    ServerPush {
        id: EventId::from(id),
        recipient: recipient.clone(),
        kind: PushKind::AddTaskMessage,
        payload: json!({"sentBy": "author", "text": id}),
    }
}

#[tokio::test]
async fn pending_events_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outbox.db");
    let u1 = RecipientId::from("u1");

    {
        let outbox = SqliteOutbox::open(&path, &ConnectionConfig::default()).unwrap();
        for id in ["m1", "m2", "m3"] {
            outbox.append(&u1, &event(&u1, id)).await.unwrap();
        }
        assert!(outbox.delete(&u1, &EventId::from("m2")).await.unwrap());
    }

    let reopened = SqliteOutbox::open(&path, &ConnectionConfig::default()).unwrap();
    let ids: Vec<String> = reopened
        .list_ordered(&u1)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id.into_inner())
        .collect();
    assert_eq!(ids, ["m1", "m3"]);
}

#[tokio::test]
async fn concurrent_appends_are_all_kept() {
    let outbox = Arc::new(SqliteOutbox::in_memory().unwrap());
    let u1 = RecipientId::from("u1");

    let mut handles = Vec::new();
    for i in 0..20 {
        let outbox = Arc::clone(&outbox);
        let u1 = u1.clone();
        handles.push(tokio::spawn(async move {
            outbox.append(&u1, &event(&u1, &format!("m{i}"))).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(outbox.list_ordered(&u1).await.unwrap().len(), 20);
}

#[tokio::test]
async fn sqlite_and_memory_agree() {
    let stores: Vec<Box<dyn OutboxStore>> = vec![
        Box::new(MemoryOutbox::new()),
        Box::new(SqliteOutbox::in_memory().unwrap()),
    ];
    let u1 = RecipientId::from("u1");

    for store in &stores {
        store.append(&u1, &event(&u1, "a")).await.unwrap();
        store.append(&u1, &event(&u1, "b")).await.unwrap();
        let mut edited = event(&u1, "a");
        edited.payload = json!({"text": "edited"});
        store.append(&u1, &edited).await.unwrap();

        let listed = store.list_ordered(&u1).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id.as_str(), "a");
        assert_eq!(listed[0].payload["text"], "edited");
        assert_eq!(listed[1].id.as_str(), "b");

        let mut empty = event(&u1, "c");
        empty.payload = serde_json::Value::Null;
        store.append(&u1, &empty).await.unwrap();
        let stored = store.get(&u1, &EventId::from("c")).await.unwrap().unwrap();
        assert!(stored.payload.is_null());
        assert_eq!(store.list_ordered(&u1).await.unwrap().len(), 3);
    }
}
