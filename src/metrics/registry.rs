use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for retry-delay observations (seconds).
const RETRY_DELAY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0];

/// Thin handle around the global metrics recorder.
///
/// After `GatewayMetrics::install()` the `metrics` crate macros (`counter!`,
/// `gauge!`, `histogram!`) can be used anywhere in the crate. The
/// `PrometheusHandle` is retained solely for rendering the `/metrics`
/// endpoint.
#[derive(Clone)]
pub struct GatewayMetrics {
    handle: PrometheusHandle,
}

impl GatewayMetrics {
    /// Install the global Prometheus recorder and register metric
    /// descriptions. Must be called **once** at startup before any
    /// `counter!` / `gauge!` / `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full(
                    "fetch_gateway_retry_delay_seconds".to_string(),
                ),
                RETRY_DELAY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        describe_counter!(
            "fetch_gateway_requests_total",
            Unit::Count,
            "Total download_buffered/download_stream calls accepted"
        );
        describe_counter!(
            "fetch_gateway_perform_cycles_total",
            Unit::Count,
            "Total reactor loop iterations"
        );
        describe_counter!(
            "fetch_gateway_downloaded_bytes_total",
            Unit::Bytes,
            "Total response bytes received across all transfers"
        );
        describe_counter!(
            "fetch_gateway_retries_total",
            Unit::Count,
            "Total retry attempts scheduled"
        );
        describe_gauge!(
            "fetch_gateway_in_flight",
            Unit::Count,
            "Transfers currently in the active set"
        );
        describe_gauge!(
            "fetch_gateway_straight_in_flight",
            Unit::Count,
            "Distinct logical requests currently tracked (ignores coalescing)"
        );
        describe_gauge!(
            "fetch_gateway_max_in_flight",
            Unit::Count,
            "Configured ceiling on active transfers"
        );
        describe_gauge!(
            "fetch_gateway_allocated_bytes",
            Unit::Bytes,
            "Sum of expected_size over transfers in the active set"
        );
        describe_gauge!(
            "fetch_gateway_max_allocated_bytes",
            Unit::Bytes,
            "Configured ceiling shared by allocated_bytes and output_bytes"
        );
        describe_gauge!(
            "fetch_gateway_output_bytes",
            Unit::Bytes,
            "Sum of live Content buffer sizes"
        );
        describe_gauge!(
            "fetch_gateway_await_queue_depth",
            Unit::Count,
            "Transfers waiting in the admission queue"
        );
        describe_gauge!(
            "fetch_gateway_await_queue_head_expected_size",
            Unit::Bytes,
            "expected_size of the transfer blocking admission, if any"
        );
        describe_histogram!(
            "fetch_gateway_retry_delay_seconds",
            Unit::Seconds,
            "Delay returned by the retry policy before each re-enqueue"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
