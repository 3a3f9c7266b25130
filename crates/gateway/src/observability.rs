use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram, IntCounter, IntCounterVec,
    TextEncoder,
};

// Prometheus metrics (default registry)
pub static REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("edge_requests_total", "Total requests entering the filter chain")
        .expect("register requests_total")
});

pub static RESPONSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("edge_responses_total", "Completed requests by final status", &["status"])
        .expect("register responses_total")
});

pub static REQUEST_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "edge_request_duration_seconds",
        "Request duration in seconds, entry to completion",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("register request_duration")
});

pub static RATE_LIMITED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("edge_rate_limited_total", "Total requests rejected by rate limiter")
        .expect("register rate_limited_total")
});

pub static RATE_LIMIT_FAIL_OPEN_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "edge_rate_limit_fail_open_total",
        "Requests admitted because the rate limit store was unavailable"
    )
    .expect("register rate_limit_fail_open_total")
});

pub static AUTH_REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("edge_auth_rejected_total", "Requests rejected by the authenticator", &["reason"])
        .expect("register auth_rejected_total")
});

pub static UPSTREAM_SELECTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("edge_upstream_selected_total", "Total upstream selections")
        .expect("register upstream_selected_total")
});

pub static UPSTREAM_FALLBACK_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "edge_upstream_fallback_total",
        "Upstream selections made by a balancer fallback rule"
    )
    .expect("register upstream_fallback_total")
});

pub static UPSTREAM_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("edge_upstream_errors_total", "Routing attempts with no instance available")
        .expect("register upstream_errors_total")
});

pub fn encode_metrics() -> (axum::http::StatusCode, String) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (
        axum::http::StatusCode::OK,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_metrics_include_touched_counters() {
        RATE_LIMITED_TOTAL.inc();
        AUTH_REJECTED_TOTAL.with_label_values(&["missing_header"]).inc();
        let (status, body) = encode_metrics();
        assert_eq!(status, axum::http::StatusCode::OK);
        assert!(body.contains("edge_rate_limited_total"));
        assert!(body.contains("edge_auth_rejected_total{reason=\"missing_header\"}"));
    }
}
