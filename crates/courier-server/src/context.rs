//! Shared state handed to every connection.

use std::sync::Arc;

use crate::config::DeliveryConfig;
use crate::dispatch::DomainDispatcher;
use crate::presence::PresenceTable;
use crate::websocket::hub::Hub;

/// Everything a connection's loops and handlers need.
pub struct DeliveryContext {
    /// Connection registry and send primitives.
    pub hub: Arc<Hub>,
    /// Presence records and subscriptions.
    pub presence: Arc<PresenceTable>,
    /// Domain handlers for non-built-in client events.
    pub dispatcher: Arc<dyn DomainDispatcher>,
    /// Per-connection timing and sizing.
    pub config: DeliveryConfig,
}
