//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_dispatch_total` (counter): client requests by outcome
//! - `lb_dispatch_duration_seconds` (histogram): time to answer a client
//! - `lb_probe_total` (counter): health probes by backend and result
//! - `lb_backend_alive` (gauge): 1=alive, 0=down
//! - `lb_forward_failures_total` (counter): forwarding errors by backend and kind

use std::net::SocketAddr;
use std::time::Instant;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(outcome: &'static str, start: Instant) {
    ::metrics::counter!("lb_dispatch_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("lb_dispatch_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_probe(backend: &str, success: bool) {
    let result = if success { "ok" } else { "failed" };
    ::metrics::counter!(
        "lb_probe_total",
        "backend" => backend.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_backend_health(backend: &str, alive: bool) {
    ::metrics::gauge!("lb_backend_alive", "backend" => backend.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}

pub fn record_forward_failure(backend: &str, kind: &'static str) {
    ::metrics::counter!(
        "lb_forward_failures_total",
        "backend" => backend.to_string(),
        "kind" => kind
    )
    .increment(1);
}
