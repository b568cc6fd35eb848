//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "courier_ws_connections_total";
/// Connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "courier_ws_disconnections_total";
/// Currently registered connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "courier_ws_connections_active";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "courier_ws_connection_duration_seconds";
/// Connections replaced by a newer one for the same recipient (counter).
pub const WS_CONNECTIONS_SUPERSEDED_TOTAL: &str = "courier_ws_connections_superseded_total";
/// Events enqueued for live delivery (counter, labels: durable).
pub const EVENTS_SENT_TOTAL: &str = "courier_events_sent_total";
/// Live pushes dropped because the outbound queue was full (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "courier_events_dropped_total";
/// Outbox appends that failed (counter).
pub const OUTBOX_APPEND_FAILURES_TOTAL: &str = "courier_outbox_append_failures_total";
/// Pending events replayed on connect (counter).
pub const CATCHUP_EVENTS_TOTAL: &str = "courier_catchup_events_total";
/// Acknowledgements processed (counter, labels: outcome).
pub const ACKS_TOTAL: &str = "courier_acks_total";
/// Client events the domain dispatcher rejected (counter, labels: kind).
pub const DISPATCH_FAILURES_TOTAL: &str = "courier_dispatch_failures_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            WS_CONNECTIONS_SUPERSEDED_TOTAL,
            EVENTS_SENT_TOTAL,
            EVENTS_DROPPED_TOTAL,
            OUTBOX_APPEND_FAILURES_TOTAL,
            CATCHUP_EVENTS_TOTAL,
            ACKS_TOTAL,
            DISPATCH_FAILURES_TOTAL,
        ];
        for name in names {
            assert!(name.starts_with("courier_"), "{name}");
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
