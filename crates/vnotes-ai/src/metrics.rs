//! Inference metrics.

use metrics::{counter, histogram};

pub mod names {
    /// AI calls by operation and outcome.
    pub const REQUESTS_TOTAL: &str = "vnotes_ai_requests_total";

    /// AI call latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "vnotes_ai_latency_seconds";
}

pub fn record_request(operation: &str, outcome: &str, latency_secs: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_secs);
}
