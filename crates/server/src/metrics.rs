//! Prometheus metrics for the dashboard pipeline.
//!
//! Recording is always safe: without an installed recorder the `metrics`
//! macros are no-ops, which is what unit tests run with.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use statboard_types::SourceKind;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Returns `false` if one was already installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(
        "dashboard_requests_total",
        "Total number of API requests to dashboard endpoints"
    );
    describe_histogram!(
        "dashboard_request_duration_seconds",
        "Duration of API requests in seconds"
    );
    describe_counter!(
        "dashboard_refresh_total",
        "Dashboard refresh runs by outcome"
    );
    describe_histogram!(
        "dashboard_refresh_duration_seconds",
        "Duration of dashboard refresh runs in seconds"
    );
    describe_counter!(
        "dashboard_source_failures_total",
        "Non-cancellation failures per backend source"
    );
}

/// Render current metrics in Prometheus text format, or `None` before `init_metrics`.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_request(endpoint: &str, status: &str, duration: Duration) {
    counter!("dashboard_requests_total", "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("dashboard_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(duration.as_secs_f64());
}

/// Record one finished refresh run.
pub fn record_refresh(outcome: &'static str, duration: Duration) {
    counter!("dashboard_refresh_total", "outcome" => outcome).increment(1);
    histogram!("dashboard_refresh_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

pub fn record_source_failure(source: SourceKind) {
    counter!("dashboard_source_failures_total", "source" => source.as_str()).increment(1);
}

/// Times one request handler.
///
/// ```ignore
/// let timer = RequestTimer::new("dashboard_refresh");
/// // ... do work ...
/// timer.finish_ok(); // or timer.finish_err(401)
/// ```
pub struct RequestTimer {
    endpoint: &'static str,
    start: Instant,
}

impl RequestTimer {
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start: Instant::now(),
        }
    }

    pub fn finish_ok(self) {
        record_request(self.endpoint, "200", self.start.elapsed());
    }

    pub fn finish_err(self, status: u16) {
        record_request(self.endpoint, &status.to_string(), self.start.elapsed());
    }
}
