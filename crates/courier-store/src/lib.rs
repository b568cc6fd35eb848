//! # courier-store
//!
//! Durable per-recipient outbox backing at-least-once delivery.
//!
//! - [`OutboxStore`]: async storage interface used by the delivery hub
//! - [`SqliteOutbox`]: `SQLite` implementation (r2d2 pool, WAL mode, embedded migrations)
//! - [`MemoryOutbox`]: process-local implementation for tests and ephemeral runs

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use errors::{OutboxError, Result};
pub use memory::MemoryOutbox;
pub use sqlite::SqliteOutbox;
pub use sqlite::connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use sqlite::migrations::run_migrations;
pub use store::OutboxStore;
