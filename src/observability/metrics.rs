//! Metrics collection and exposition.
//!
//! # Metrics
//! - `kms_http_requests_total` (counter): requests by method, route, status
//! - `kms_http_request_duration_seconds` (histogram): latency distribution
//! - `kms_signatures_total` (counter): signatures by algorithm
//! - `kms_transactions_submitted_total` (counter): broadcasts by kind
//! - `kms_scheduler_records_total` (counter): processed records by class and outcome
//! - `kms_upstream_health` (gauge): 1=healthy, 0=unhealthy per collaborator
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("kms_http_requests_total", &labels).increment(1);
    metrics::histogram!("kms_http_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_signature(algorithm: &str) {
    metrics::counter!("kms_signatures_total", "algorithm" => algorithm.to_string()).increment(1);
}

pub fn record_submission(kind: &str) {
    metrics::counter!("kms_transactions_submitted_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_scheduler_record(class: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "kms_scheduler_records_total",
        "class" => class.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_upstream_health(upstream: &str, healthy: bool) {
    metrics::gauge!("kms_upstream_health", "upstream" => upstream.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
