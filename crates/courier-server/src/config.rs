//! Server and delivery configuration.

use std::time::Duration;

use courier_settings::CourierSettings;
use serde::{Deserialize, Serialize};

/// Listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrently registered connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
        }
    }
}

/// Per-connection timing and sizing.
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    /// Interval between keepalive pings. Must be shorter than `idle_timeout`.
    pub keepalive_interval: Duration,
    /// Close the connection after this long without inbound traffic.
    pub idle_timeout: Duration,
    /// Deadline for each transport write.
    pub write_timeout: Duration,
    /// Largest accepted inbound frame in bytes.
    pub max_frame_bytes: usize,
    /// Bounded outbound queue capacity per connection.
    pub outbound_queue_capacity: usize,
    /// Client events handled concurrently per connection.
    pub dispatch_concurrency: usize,
    /// Upper bound on the shutdown drain.
    pub shutdown_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(54),
            idle_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            max_frame_bytes: 2048,
            outbound_queue_capacity: 256,
            dispatch_concurrency: 8,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &CourierSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
        }
    }
}

impl DeliveryConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &CourierSettings) -> Self {
        let d = &settings.delivery;
        Self {
            keepalive_interval: d.keepalive_interval(),
            idle_timeout: d.idle_timeout(),
            write_timeout: d.write_timeout(),
            max_frame_bytes: d.max_frame_bytes,
            outbound_queue_capacity: d.outbound_queue_capacity,
            dispatch_concurrency: d.dispatch_concurrency,
            shutdown_timeout: d.shutdown_timeout(),
        }
    }
}
