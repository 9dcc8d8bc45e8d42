//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//!   (`unknown` unless the service resolved to an instance)
//! - `gateway_request_duration_seconds` (histogram): gateway latency
//! - `registry_events_total` (counter): register/heartbeat/expire/... by service
//! - `registry_instances` (gauge): records held by the registry
//! - `circuit_breaker_transitions_total` (counter): by breaker, from, to
//! - `circuit_breaker_rejections_total` (counter): calls refused while open
//! - `circuit_breaker_calls_total` (counter): attempted calls by outcome
//! - `payment_confirmations_total` (counter): by final status
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("service", service.to_string()),
    ];
    counter!("gateway_requests_total", &labels[..]).increment(1);
    histogram!("gateway_request_duration_seconds", &labels[2..]).record(start.elapsed().as_secs_f64());
}

pub fn record_registry_event(event: &'static str, service: &str) {
    counter!("registry_events_total", "event" => event, "service" => service.to_string()).increment(1);
}

pub fn record_registry_size(instances: usize) {
    gauge!("registry_instances").set(instances as f64);
}

pub fn record_breaker_transition(breaker: &str, from: &'static str, to: &'static str) {
    counter!(
        "circuit_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from,
        "to" => to
    )
    .increment(1);
}

pub fn record_breaker_rejection(breaker: &str) {
    counter!("circuit_breaker_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_breaker_call(breaker: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("circuit_breaker_calls_total", "breaker" => breaker.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_confirmation(status: &'static str) {
    counter!("payment_confirmations_total", "status" => status).increment(1);
}
