//! Metrics collection and exposition.
//!
//! # Metrics
//! - `swift_connections_total` (counter): accepted connections by mode
//! - `swift_active_connections` (gauge): current connection count
//! - `swift_responses_total` (counter): static-file responses by status
//! - `swift_proxy_bytes_total` (counter): relayed bytes by direction
//! - `swift_tls_handshake_failures_total` (counter)

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_connection(mode: &'static str) {
    counter!("swift_connections_total", "mode" => mode).increment(1);
}

pub fn set_active_connections(count: u64) {
    gauge!("swift_active_connections").set(count as f64);
}

pub fn record_response(status: u16) {
    counter!("swift_responses_total", "status" => status.to_string()).increment(1);
}

pub fn record_proxy_bytes(direction: &'static str, bytes: u64) {
    counter!("swift_proxy_bytes_total", "direction" => direction).increment(bytes);
}

pub fn record_tls_handshake_failure() {
    counter!("swift_tls_handshake_failures_total").increment(1);
}
