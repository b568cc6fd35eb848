//! Settings sections.
//!
//! All sections deserialize with `default`, so a settings file only needs
//! the keys it overrides.

use std::collections::HashMap;
use std::time::Duration;

use courier_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    /// Network listener settings.
    pub server: ServerSettings,
    /// Connection and delivery tuning.
    pub delivery: DeliverySettings,
    /// Handshake authentication.
    pub auth: AuthSettings,
    /// Outbox persistence.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Static group membership (group id → member ids).
    pub groups: HashMap<String, Vec<String>>,
}

impl CourierSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.delivery.validate()
    }
}

/// Network listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (0 picks a free port).
    pub port: u16,
    /// Maximum number of simultaneously registered connections.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
        }
    }
}

/// Connection lifecycle and delivery tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Interval between keepalive pings written to each client.
    pub keepalive_interval_ms: u64,
    /// A connection with no inbound traffic for this long is closed.
    pub idle_timeout_ms: u64,
    /// Deadline for a single transport write.
    pub write_timeout_ms: u64,
    /// Largest accepted inbound frame.
    pub max_frame_bytes: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Client events handled concurrently per connection.
    pub dispatch_concurrency: usize,
    /// Upper bound on draining connections at shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: 54_000,
            idle_timeout_ms: 60_000,
            write_timeout_ms: 10_000,
            max_frame_bytes: 2048,
            outbound_queue_capacity: 256,
            dispatch_concurrency: 8,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl DeliverySettings {
    /// Keepalive interval as a [`Duration`].
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Per-write deadline as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Shutdown drain bound as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Reject combinations that would drop healthy idle connections or
    /// stall delivery.
    pub fn validate(&self) -> Result<()> {
        if self.keepalive_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "delivery.keepaliveIntervalMs must be positive".into(),
            ));
        }
        if self.keepalive_interval_ms >= self.idle_timeout_ms {
            return Err(SettingsError::InvalidValue(format!(
                "delivery.keepaliveIntervalMs ({}) must be shorter than delivery.idleTimeoutMs ({})",
                self.keepalive_interval_ms, self.idle_timeout_ms
            )));
        }
        if self.write_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "delivery.writeTimeoutMs must be positive".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "delivery.maxFrameBytes must be positive".into(),
            ));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "delivery.outboundQueueCapacity must be positive".into(),
            ));
        }
        if self.dispatch_concurrency == 0 {
            return Err(SettingsError::InvalidValue(
                "delivery.dispatchConcurrency must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Handshake authentication settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 shared secret used to verify bearer tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// Required `iss` claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Required `aud` claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

/// Outbox persistence settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Path of the `SQLite` outbox database. Defaults to `~/.courier/outbox.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
