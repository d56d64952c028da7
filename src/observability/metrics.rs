//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_responses_total` (counter): gate outcomes by `outcome`
//!   (`delivered`, `dropped`, `fallback`)
//! - `gate_connections_total` (counter): accepted connections
//! - `gate_connections_active` (gauge): current connection count
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! deployments without the exporter pay nothing.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count one request leaving the gate.
pub fn record_outcome(outcome: &'static str) {
    ::metrics::counter!("gate_responses_total", "outcome" => outcome).increment(1);
}

pub fn record_connection_opened() {
    ::metrics::counter!("gate_connections_total").increment(1);
    ::metrics::gauge!("gate_connections_active").increment(1.0);
}

pub fn record_connection_closed() {
    ::metrics::gauge!("gate_connections_active").decrement(1.0);
}
