use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics exporter
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    init_metric_descriptions();

    handle
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "logq_requests_total",
        "Total number of query API requests"
    );
    describe_histogram!(
        "logq_request_duration_seconds",
        "Query request duration in seconds"
    );
    describe_gauge!(
        "logq_tail_active_sessions",
        "Number of currently active tail sessions"
    );
    describe_counter!(
        "logq_tail_frames_total",
        "Total number of frames written to tail connections"
    );
    describe_gauge!(
        "logq_gateway_info",
        "Gateway version and build information"
    );

    gauge!("logq_gateway_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a query request
pub fn record_request(route: &'static str) {
    counter!("logq_requests_total", "route" => route).increment(1);
}

/// Record query request duration
pub fn record_duration(route: &'static str, duration: Duration) {
    histogram!("logq_request_duration_seconds", "route" => route).record(duration.as_secs_f64());
}

/// Track tail session lifecycle
pub fn tail_session_started() {
    gauge!("logq_tail_active_sessions").increment(1.0);
}

pub fn tail_session_ended() {
    gauge!("logq_tail_active_sessions").decrement(1.0);
}

/// Record a frame written to a tail connection
pub fn record_tail_frame(kind: &'static str) {
    counter!("logq_tail_frames_total", "kind" => kind).increment(1);
}
