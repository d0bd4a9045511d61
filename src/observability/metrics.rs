//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cgi_requests_total` (counter): requests by method, status
//! - `cgi_request_duration_seconds` (histogram): latency by method
//! - `cgi_handler_spawns_total` (counter): handler processes started
//! - `cgi_handler_outcomes_total` (counter): handler terminations by outcome
//! - `cgi_handlers_active` (gauge): handler processes currently alive

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "cgi_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("cgi_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_handler_spawn() {
    metrics::counter!("cgi_handler_spawns_total").increment(1);
}

pub fn record_handler_outcome(outcome: &'static str) {
    metrics::counter!("cgi_handler_outcomes_total", "outcome" => outcome).increment(1);
}

pub fn set_active_handlers(count: usize) {
    metrics::gauge!("cgi_handlers_active").set(count as f64);
}
