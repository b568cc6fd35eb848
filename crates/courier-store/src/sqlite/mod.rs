//! `SQLite`-backed outbox.
//!
//! Queries run on tokio's blocking pool; each call checks a connection out of
//! the r2d2 pool for its duration.

pub mod connection;
pub mod migrations;
pub mod repository;

use std::path::Path;

use async_trait::async_trait;
use courier_core::{EventId, RecipientId, ServerPush};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{OutboxError, Result};
use crate::store::OutboxStore;
use connection::{ConnectionConfig, ConnectionPool};
use repository::OutboxRepo;

/// Durable outbox stored in a `SQLite` database.
#[derive(Clone)]
pub struct SqliteOutbox {
    pool: ConnectionPool,
}

impl SqliteOutbox {
    /// Wrap an existing pool. The schema must already be migrated.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        let path_str = path.to_str().ok_or_else(|| OutboxError::Migration {
            message: format!("database path is not valid UTF-8: {}", path.display()),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                OutboxError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let pool = connection::new_file(path_str, config)?;
        let applied = migrations::run_migrations(&*pool.get()?)?;
        info!(path = %path.display(), applied, "outbox database ready");
        Ok(Self::new(pool))
    }

    /// Fresh in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        let _ = migrations::run_migrations(&*pool.get()?)?;
        Ok(Self::new(pool))
    }

    /// Total pending events across all recipients.
    pub async fn pending_count(&self) -> Result<u64> {
        self.with_conn(OutboxRepo::count).await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| OutboxError::Task(e.to_string()))?
    }
}

#[async_trait]
impl OutboxStore for SqliteOutbox {
    async fn append(&self, recipient: &RecipientId, event: &ServerPush) -> Result<()> {
        let recipient = recipient.clone();
        let event = event.clone();
        debug!(recipient = %recipient, event_id = %event.id, kind = %event.kind, "outbox append");
        self.with_conn(move |conn| OutboxRepo::append(conn, &recipient, &event))
            .await
    }

    async fn list_ordered(&self, recipient: &RecipientId) -> Result<Vec<ServerPush>> {
        let recipient = recipient.clone();
        self.with_conn(move |conn| OutboxRepo::list_ordered(conn, &recipient))
            .await
    }

    async fn get(&self, recipient: &RecipientId, event_id: &EventId) -> Result<Option<ServerPush>> {
        let recipient = recipient.clone();
        let event_id = event_id.clone();
        self.with_conn(move |conn| OutboxRepo::get(conn, &recipient, &event_id))
            .await
    }

    async fn delete(&self, recipient: &RecipientId, event_id: &EventId) -> Result<bool> {
        let recipient = recipient.clone();
        let event_id = event_id.clone();
        self.with_conn(move |conn| OutboxRepo::delete(conn, &recipient, &event_id))
            .await
    }
}
