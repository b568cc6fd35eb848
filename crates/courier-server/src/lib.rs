//! # courier-server
//!
//! Real-time delivery core over axum WebSockets.
//!
//! - Connection registry ([`Hub`]): one live connection per recipient, bounded
//!   outbound queues, group fan-out
//! - At-least-once delivery: durable events go to the outbox before the live
//!   queue, are replayed on connect and removed on acknowledgement
//! - Presence: online/offline tracking and subscriber notification
//! - Built-in client events (ack, ping, read receipts, presence); everything
//!   else goes to a [`DomainDispatcher`]
//! - HTTP surface: health, version, metrics, presence lookup, pending events,
//!   notification acks
//! - Graceful shutdown via `CancellationToken` and a task tracker

#![deny(unsafe_code)]

pub mod ack;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod groups;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod presence;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use ack::AckOutcome;
pub use config::{DeliveryConfig, ServerConfig};
pub use context::DeliveryContext;
pub use dispatch::{DispatchError, DomainDispatcher, UnsupportedDispatcher};
pub use errors::{DeliveryError, Result};
pub use groups::{GroupMembership, MembershipError, StaticGroups};
pub use identity::{IdentityError, IdentityResolver, JwtIdentityResolver};
pub use presence::PresenceTable;
pub use server::CourierServer;
pub use websocket::hub::{FanoutReport, Hub, SendOutcome};
