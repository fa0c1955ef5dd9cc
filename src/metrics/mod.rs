mod registry;

pub use registry::GatewayMetrics;

use std::time::Duration;

/// Thin wrapper around the `metrics` crate facade, recording the gateway's
/// counters and gauges. Kept as plain functions (rather than a struct the
/// gateway has to thread through every call) because the `metrics` crate's
/// recorder is itself a global installed once via [`GatewayMetrics::install`]
/// — the same describe/install split used elsewhere in this crate's metrics
/// setup.
pub struct Counters;

impl Counters {
    pub fn request_submitted() {
        metrics::counter!("fetch_gateway_requests_total").increment(1);
    }

    pub fn perform_cycle() {
        metrics::counter!("fetch_gateway_perform_cycles_total").increment(1);
    }

    pub fn downloaded_bytes(n: u64) {
        metrics::counter!("fetch_gateway_downloaded_bytes_total").increment(n);
    }

    pub fn retry_scheduled() {
        metrics::counter!("fetch_gateway_retries_total").increment(1);
    }

    pub fn set_in_flight(n: usize) {
        metrics::gauge!("fetch_gateway_in_flight").set(n as f64);
    }

    pub fn set_straight_in_flight(n: usize) {
        metrics::gauge!("fetch_gateway_straight_in_flight").set(n as f64);
    }

    pub fn set_max_in_flight(n: u64) {
        metrics::gauge!("fetch_gateway_max_in_flight").set(n as f64);
    }

    pub fn set_allocated_bytes(n: u64) {
        metrics::gauge!("fetch_gateway_allocated_bytes").set(n as f64);
    }

    pub fn set_max_allocated_bytes(n: u64) {
        metrics::gauge!("fetch_gateway_max_allocated_bytes").set(n as f64);
    }

    pub fn set_await_queue_depth(n: usize) {
        metrics::gauge!("fetch_gateway_await_queue_depth").set(n as f64);
    }

    pub fn set_await_queue_head_expected_size(n: u64) {
        metrics::gauge!("fetch_gateway_await_queue_head_expected_size").set(n as f64);
    }

    pub fn observe_retry_delay(delay: Duration) {
        metrics::histogram!("fetch_gateway_retry_delay_seconds").record(delay.as_secs_f64());
    }
}
